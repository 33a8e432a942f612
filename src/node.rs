//! Per-node handle: owns a node's pools and its last-known status.

pub use crate::node_id::NodeId;

use crate::error::Result;
use crate::pool::{Connection, ConnectionFactory, NodePool, PoolConfig};
use crate::probe::SharedProbe;
use crate::status::ClusterStatus;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Opaque per-request consistency directive, forwarded to the node's pool
/// without interpretation by the router core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyLevel(pub String);

/// Contract the core depends on for a single node. Any implementation
/// is acceptable; [`PooledNodeHandle`] is the default one this crate ships.
#[async_trait]
pub trait NodeHandle: Send + Sync {
    fn node_id(&self) -> &NodeId;

    /// Blocking (async) refresh of this node's cached status via a probe.
    async fn refresh_status(&self) -> Result<ClusterStatus>;

    /// Last cached status, from the most recent `refresh_status`.
    async fn status(&self) -> ClusterStatus;

    /// Borrow a connection from the primary pool, honoring `consistency`.
    async fn get_connection(&self, consistency: ConsistencyLevel) -> Result<Box<dyn Connection>>;

    /// Re-enable the primary pool after having been downed. Idempotent.
    async fn on_activate(&self);

    /// Quiesce the primary pool so it stops dispensing connections. Idempotent.
    async fn on_down(&self);

    /// Tear down both pools. Idempotent.
    async fn shutdown(&self);
}

/// Default [`NodeHandle`]: a primary pool for application traffic, a small
/// internal pool reserved for status probes, and the last-known status.
pub struct PooledNodeHandle {
    node_id: NodeId,
    primary_pool: NodePool,
    internal_pool: NodePool,
    probe: SharedProbe,
    status: RwLock<ClusterStatus>,
}

impl PooledNodeHandle {
    pub fn new(
        node_id: NodeId,
        primary_config: PoolConfig,
        internal_config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        probe: SharedProbe,
    ) -> Self {
        Self {
            primary_pool: NodePool::new(node_id.clone(), primary_config, Arc::clone(&factory)),
            internal_pool: NodePool::new(node_id.clone(), internal_config, factory),
            node_id,
            probe,
            status: RwLock::new(ClusterStatus::default()),
        }
    }

    /// Default sizing for the internal probe-only pool: small and bounded
    /// so probe traffic cannot starve application traffic.
    pub fn default_internal_pool_config() -> PoolConfig {
        PoolConfig {
            min_connections: 0,
            max_connections: 8,
            warmup_connections: 0,
            ..PoolConfig::default()
        }
    }
}

#[async_trait]
impl NodeHandle for PooledNodeHandle {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn refresh_status(&self) -> Result<ClusterStatus> {
        // The probe is issued logically "through the node's internal pool";
        // since probing here is a caller-supplied async call rather than a
        // raw `Connection`, we simply reserve pool capacity around it so a
        // slow probe still respects the internal pool's bound.
        let _reservation = self.internal_pool.acquire().await.ok();
        let status = self.probe.probe(&self.node_id).await?;
        if let Some(conn) = _reservation {
            self.internal_pool.release(conn).await;
        }
        *self.status.write().await = status.clone();
        Ok(status)
    }

    async fn status(&self) -> ClusterStatus {
        self.status.read().await.clone()
    }

    async fn get_connection(&self, _consistency: ConsistencyLevel) -> Result<Box<dyn Connection>> {
        self.primary_pool.acquire().await
    }

    async fn on_activate(&self) {
        self.primary_pool.unquiesce().await;
    }

    async fn on_down(&self) {
        self.primary_pool.quiesce().await;
    }

    async fn shutdown(&self) {
        self.primary_pool.shutdown().await;
        self.internal_pool.shutdown().await;
    }
}

/// Builds a [`NodeHandle`] for a freshly discovered node id. The membership
/// manager depends on this rather than constructing [`PooledNodeHandle`]
/// directly, so callers can swap in their own `NodeHandle` implementation.
pub trait NodeHandleFactory: Send + Sync {
    fn create(&self, node_id: NodeId) -> Arc<dyn NodeHandle>;
}

/// Default factory: every node gets a [`PooledNodeHandle`] built from the same
/// connection factory, probe, and pool sizing.
pub struct PooledNodeHandleFactory {
    pub connection_factory: Arc<dyn ConnectionFactory>,
    pub probe: SharedProbe,
    pub primary_pool_config: PoolConfig,
}

impl NodeHandleFactory for PooledNodeHandleFactory {
    fn create(&self, node_id: NodeId) -> Arc<dyn NodeHandle> {
        Arc::new(PooledNodeHandle::new(
            node_id,
            self.primary_pool_config.clone(),
            PooledNodeHandle::default_internal_pool_config(),
            Arc::clone(&self.connection_factory),
            Arc::clone(&self.probe),
        ))
    }
}

impl PooledNodeHandleFactory {
    /// Derives the primary pool's sizing and timeouts from the matching
    /// `RouterConfig` fields, so a caller only has to supply the two
    /// collaborators this crate cannot provide on its own.
    pub fn from_router_config(
        config: &crate::config::RouterConfig,
        connection_factory: Arc<dyn ConnectionFactory>,
        probe: SharedProbe,
    ) -> Self {
        Self {
            connection_factory,
            probe,
            primary_pool_config: PoolConfig {
                min_connections: config.min_connections_idle_per_host,
                max_connections: config.max_connections_per_host,
                idle_timeout: config.idle_timeout,
                max_lifetime: config.idle_timeout.saturating_mul(12),
                acquire_timeout: config.connection_timeout,
                warmup_connections: config.min_connections_idle_per_host,
            },
        }
    }
}
