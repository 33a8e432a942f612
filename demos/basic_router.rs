//! Demonstrates wiring a [`GaleraRouter`] end to end against an in-memory
//! three-node cluster: a fake `ConnectionFactory`, a scripted status probe,
//! and the default pooled node handles.

use async_trait::async_trait;
use galera_router::{
    ClusterStatus, Connection, ConnectionFactory, GaleraRouter, NodeHandleFactory, NodeId,
    NodeStatusProbe, PooledNodeHandleFactory, Result, RouterConfig,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct DemoConnection {
    id: u64,
    node: NodeId,
}

#[async_trait]
impl Connection for DemoConnection {
    async fn is_healthy(&self) -> bool {
        true
    }

    async fn close(&mut self) {
        tracing::debug!(connection = self.id, node = %self.node, "closing connection");
    }

    fn connection_id(&self) -> u64 {
        self.id
    }

    fn node_id(&self) -> &NodeId {
        &self.node
    }
}

struct DemoConnectionFactory {
    next_id: AtomicU64,
}

#[async_trait]
impl ConnectionFactory for DemoConnectionFactory {
    async fn connect(&self, node_id: &NodeId) -> Result<Box<dyn Connection>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(DemoConnection {
            id,
            node: node_id.clone(),
        }))
    }
}

/// Reports every node in `cluster` as a healthy, synced primary-component
/// member, the way a real probe would once it parsed a `SHOW STATUS` reply.
struct DemoProbe {
    cluster: HashSet<NodeId>,
}

#[async_trait]
impl NodeStatusProbe for DemoProbe {
    async fn probe(&self, _node_id: &NodeId) -> Result<ClusterStatus> {
        Ok(ClusterStatus::healthy(self.cluster.clone()))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cluster: HashSet<NodeId> = ["db-a:3306", "db-b:3306", "db-c:3306"]
        .into_iter()
        .map(NodeId::new)
        .collect();

    let probe: Arc<dyn NodeStatusProbe> = Arc::new(DemoProbe {
        cluster: cluster.clone(),
    });
    let connection_factory = Arc::new(DemoConnectionFactory {
        next_id: AtomicU64::new(1),
    });

    let config = RouterConfig::builder()
        .seeds(["db-a:3306"])
        .database("app".to_string())
        .discover_period(std::time::Duration::from_secs(10))
        .build()?;

    let handle_factory: Arc<dyn NodeHandleFactory> = Arc::new(
        PooledNodeHandleFactory::from_router_config(&config, connection_factory, probe),
    );

    let router = GaleraRouter::connect(config, handle_factory).await?;
    tracing::info!(known_nodes = router.known_node_count(), "router connected");

    for _ in 0..5 {
        let conn = router.get_connection().await?;
        tracing::info!(connection = conn.connection_id(), "borrowed connection");
    }

    router.shutdown().await;
    Ok(())
}
