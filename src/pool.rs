//! Per-node connection pool.
//!
//! Owns idle connections for a single node plus a semaphore bounding concurrent
//! checkouts. This is the "physical connection pool" the core treats as an
//! opaque collaborator (see [`crate::node::NodeHandle`]); the implementation here
//! is a usable default, not a contractual part of the router core.

use crate::error::{Result, RouterError};
use crate::node_id::NodeId;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};

/// A raw connection to one node. The router never interprets its contents.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn is_healthy(&self) -> bool;
    async fn close(&mut self);
    fn connection_id(&self) -> u64;
    fn node_id(&self) -> &NodeId;
}

/// Configuration for a single node's pool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
    pub warmup_connections: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(5),
            warmup_connections: 0,
        }
    }
}

struct ManagedConnection {
    connection: Box<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

impl ManagedConnection {
    fn new(connection: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used_at: now,
        }
    }

    fn is_expired(&self, max_lifetime: Duration, idle_timeout: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime || self.last_used_at.elapsed() > idle_timeout
    }
}

/// Factory for brand-new connections to a node. Supplied by the caller so this
/// crate never hard-codes a wire protocol.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, node_id: &NodeId) -> Result<Box<dyn Connection>>;
}

/// Connection pool for a single node. Quiesces (refuses new checkouts) while
/// `quiesced` is set, which is how [`crate::node::NodeHandle::on_down`] disables
/// application traffic without tearing the pool down.
pub struct NodePool {
    node_id: NodeId,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<ManagedConnection>>,
    semaphore: Arc<Semaphore>,
    quiesced: RwLock<bool>,
}

impl NodePool {
    pub fn new(node_id: NodeId, config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            node_id,
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            factory,
            idle: Mutex::new(VecDeque::new()),
            quiesced: RwLock::new(false),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Disable new checkouts without dropping idle connections.
    pub async fn quiesce(&self) {
        *self.quiesced.write().await = true;
    }

    /// Re-enable checkouts after a `quiesce`.
    pub async fn unquiesce(&self) {
        *self.quiesced.write().await = false;
    }

    pub async fn is_quiesced(&self) -> bool {
        *self.quiesced.read().await
    }

    pub async fn acquire(&self) -> Result<Box<dyn Connection>> {
        if self.is_quiesced().await {
            return Err(RouterError::Connection {
                node: self.node_id.clone(),
                reason: "pool is quiesced".to_string(),
            });
        }

        if let Some(conn) = self.pop_healthy_idle().await {
            return Ok(conn);
        }

        let permit = tokio::time::timeout(self.config.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| RouterError::Connection {
                node: self.node_id.clone(),
                reason: format!(
                    "timed out acquiring a connection within {:?}",
                    self.config.acquire_timeout
                ),
            })?
            .map_err(|_| RouterError::Connection {
                node: self.node_id.clone(),
                reason: "pool semaphore closed".to_string(),
            })?;

        let conn = self.factory.connect(&self.node_id).await?;
        permit.forget();
        Ok(conn)
    }

    pub async fn release(&self, mut connection: Box<dyn Connection>) {
        if self.is_quiesced().await || !connection.is_healthy().await {
            connection.close().await;
            self.semaphore.add_permits(1);
            return;
        }

        let mut idle = self.idle.lock().await;
        idle.push_back(ManagedConnection::new(connection));
    }

    async fn pop_healthy_idle(&self) -> Option<Box<dyn Connection>> {
        let mut idle = self.idle.lock().await;
        while let Some(mut managed) = idle.pop_front() {
            if managed.is_expired(self.config.max_lifetime, self.config.idle_timeout) {
                managed.connection.close().await;
                self.semaphore.add_permits(1);
                continue;
            }
            if !managed.connection.is_healthy().await {
                managed.connection.close().await;
                self.semaphore.add_permits(1);
                continue;
            }
            managed.last_used_at = Instant::now();
            return Some(managed.connection);
        }
        None
    }

    pub async fn warmup(&self) -> Result<()> {
        let count = self.config.warmup_connections.min(self.config.max_connections);
        for _ in 0..count {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| RouterError::Connection {
                    node: self.node_id.clone(),
                    reason: "pool semaphore closed during warmup".to_string(),
                })?;
            let conn = self.factory.connect(&self.node_id).await?;
            _permit.forget();
            self.idle.lock().await.push_back(ManagedConnection::new(conn));
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.quiesce().await;
        let mut idle = self.idle.lock().await;
        while let Some(mut managed) = idle.pop_front() {
            managed.connection.close().await;
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConnection {
        id: u64,
        node: NodeId,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn is_healthy(&self) -> bool {
            true
        }
        async fn close(&mut self) {}
        fn connection_id(&self) -> u64 {
            self.id
        }
        fn node_id(&self) -> &NodeId {
            &self.node
        }
    }

    struct FakeFactory;

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        async fn connect(&self, node_id: &NodeId) -> Result<Box<dyn Connection>> {
            Ok(Box::new(FakeConnection {
                id: 1,
                node: node_id.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn acquire_and_release_round_trips_through_idle_queue() {
        let pool = NodePool::new(
            NodeId::new("a:3306"),
            PoolConfig::default(),
            Arc::new(FakeFactory),
        );

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count().await, 0);
        pool.release(conn).await;
        assert_eq!(pool.idle_count().await, 1);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.idle_count().await, 0);
        pool.release(conn).await;
    }

    #[tokio::test]
    async fn quiesced_pool_refuses_new_checkouts() {
        let pool = NodePool::new(
            NodeId::new("a:3306"),
            PoolConfig::default(),
            Arc::new(FakeFactory),
        );
        pool.quiesce().await;
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn warmup_fills_idle_queue() {
        let mut config = PoolConfig::default();
        config.warmup_connections = 3;
        let pool = NodePool::new(NodeId::new("a:3306"), config, Arc::new(FakeFactory));
        pool.warmup().await.unwrap();
        assert_eq!(pool.idle_count().await, 3);
    }
}
