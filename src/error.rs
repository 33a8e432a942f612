//! Error types for the router.

use crate::node::NodeId;
use thiserror::Error;

/// Errors produced anywhere in the router.
///
/// Discovery-time variants ([`RouterError::Probe`], [`RouterError::NotReady`]) are
/// caught at the tick boundary and never reach application code directly; they are
/// listed here because they still need a concrete type to flow through `Result`
/// internally and to format listener/log messages consistently.
#[derive(Error, Debug)]
pub enum RouterError {
    /// Transport or query failure while probing a node's status.
    #[error("probe failed for {node}: {source}")]
    Probe {
        node: NodeId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Node responded but its replication state disqualifies it from serving.
    #[error("node {node} not ready: {reason}")]
    NotReady { node: NodeId, reason: String },

    /// The election policy could not choose a node (e.g. empty active set).
    #[error("election policy failed: {0}")]
    Policy(String),

    /// Retry budget exhausted without finding a usable node.
    #[error("no host available after {attempts} attempt(s)")]
    NoHostAvailable { attempts: usize },

    /// Failure obtaining a connection from a node's pool.
    #[error("connection error on {node}: {reason}")]
    Connection { node: NodeId, reason: String },

    /// Invalid `RouterConfig`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The router has been shut down.
    #[error("router is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, RouterError>;
