//! Node status probing.
//!
//! The probe issues a status query against a node and returns a [`ClusterStatus`].
//! The concrete SQL query is out of scope for this crate; [`NodeStatusProbe`]
//! is the seam a caller plugs a real driver into. [`SyntheticProbe`] is an
//! injectable prober used for tests: rather than a boolean baked into the
//! pool, the manager is constructed with a different prober.

use crate::error::Result;
use crate::node_id::NodeId;
use crate::status::ClusterStatus;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Issues a status query to one node.
#[async_trait]
pub trait NodeStatusProbe: Send + Sync {
    async fn probe(&self, node_id: &NodeId) -> Result<ClusterStatus>;
}

/// A probe that always reports a healthy, synced, primary-component node whose
/// `cluster_nodes` is the full seed set. Used when `RouterConfig::test_mode` is set.
pub struct SyntheticProbe {
    cluster_nodes: HashSet<NodeId>,
}

impl SyntheticProbe {
    pub fn new(cluster_nodes: HashSet<NodeId>) -> Self {
        Self { cluster_nodes }
    }
}

#[async_trait]
impl NodeStatusProbe for SyntheticProbe {
    async fn probe(&self, _node_id: &NodeId) -> Result<ClusterStatus> {
        Ok(ClusterStatus::healthy(self.cluster_nodes.clone()))
    }
}

/// A probe that delegates to a caller-supplied async closure, for scripting
/// scenario-driven tests against the real discovery loop where the probe's
/// answer needs to change between ticks.
pub struct ScriptedProbe<F>
where
    F: Fn(&NodeId) -> Result<ClusterStatus> + Send + Sync,
{
    script: F,
}

impl<F> ScriptedProbe<F>
where
    F: Fn(&NodeId) -> Result<ClusterStatus> + Send + Sync,
{
    pub fn new(script: F) -> Self {
        Self { script }
    }
}

#[async_trait]
impl<F> NodeStatusProbe for ScriptedProbe<F>
where
    F: Fn(&NodeId) -> Result<ClusterStatus> + Send + Sync,
{
    async fn probe(&self, node_id: &NodeId) -> Result<ClusterStatus> {
        (self.script)(node_id)
    }
}

/// Wraps any `NodeStatusProbe` so it can be shared across the manager and
/// per-node handles without cloning the underlying implementation.
pub type SharedProbe = Arc<dyn NodeStatusProbe>;
