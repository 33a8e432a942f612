//! Replication status model returned by a node probe.

use crate::node::NodeId;
use std::collections::HashSet;
use std::fmt;

/// Replication state as reported by a node's status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationState {
    /// Replication is caught up and the node is serving normally.
    Synced,
    /// The node is streaming state to a joining peer.
    Donor,
    /// Node is joining, desynced, or otherwise not ready.
    Other,
}

impl fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationState::Synced => write!(f, "Synced"),
            ReplicationState::Donor => write!(f, "Donor"),
            ReplicationState::Other => write!(f, "Other"),
        }
    }
}

/// Immutable snapshot of a node's cluster status, as returned by a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    pub state: ReplicationState,
    pub is_primary: bool,
    pub is_donor: bool,
    pub is_synced: bool,
    pub cluster_nodes: HashSet<NodeId>,
}

impl ClusterStatus {
    /// A status representing a healthy, synced, primary-component node.
    pub fn healthy(cluster_nodes: HashSet<NodeId>) -> Self {
        Self {
            state: ReplicationState::Synced,
            is_primary: true,
            is_donor: false,
            is_synced: true,
            cluster_nodes,
        }
    }

    /// A status that will cause the node to be classified as not ready.
    pub fn not_ready(cluster_nodes: HashSet<NodeId>) -> Self {
        Self {
            state: ReplicationState::Other,
            is_primary: true,
            is_donor: false,
            is_synced: false,
            cluster_nodes,
        }
    }
}

impl Default for ClusterStatus {
    fn default() -> Self {
        Self {
            state: ReplicationState::Other,
            is_primary: false,
            is_donor: false,
            is_synced: false,
            cluster_nodes: HashSet::new(),
        }
    }
}
