//! Lifecycle event listener: a capability set of three callback slots
//! rather than an inheritance hierarchy.

use crate::node_id::NodeId;

/// Receives node lifecycle transitions as the discovery task commits them.
/// Called synchronously from the discovery task; implementations must not block.
pub trait ClusterListener: Send + Sync {
    fn on_activating_node(&self, _node_id: &NodeId) {}
    fn on_marking_node_as_down(&self, _node_id: &NodeId, _cause: &str) {}
    fn on_removing_node(&self, _node_id: &NodeId) {}
}

/// Default listener: logs each transition via `tracing`.
#[derive(Default)]
pub struct LoggingListener;

impl ClusterListener for LoggingListener {
    fn on_activating_node(&self, node_id: &NodeId) {
        tracing::info!(node = %node_id, "node activated");
    }

    fn on_marking_node_as_down(&self, node_id: &NodeId, cause: &str) {
        tracing::warn!(node = %node_id, cause, "node marked down");
    }

    fn on_removing_node(&self, node_id: &NodeId) {
        tracing::info!(node = %node_id, "node removed");
    }
}
