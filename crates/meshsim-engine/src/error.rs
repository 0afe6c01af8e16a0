//! Error types for meshsim-engine.

use meshsim_topology::{NodeId, TopologyError};
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or process failure reaching a node.
    #[error("node {node} unavailable: {reason}")]
    NodeUnavailable { node: NodeId, reason: String },

    /// The request references unknown nodes or malformed values. Nothing was changed.
    #[error("invalid topology request: {0}")]
    InvalidTopologyRequest(#[from] TopologyError),

    /// A provider-wide operation failed (client shaping, bootstrap).
    #[error("provider error: {0}")]
    Provider(String),

    /// The configured provider does not implement this capability.
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
}

impl Error {
    pub fn unavailable(node: NodeId, reason: impl std::fmt::Display) -> Self {
        Self::NodeUnavailable {
            node,
            reason: reason.to_string(),
        }
    }

    pub fn unknown_node(node: NodeId) -> Self {
        Self::InvalidTopologyRequest(TopologyError::UnknownNode(node))
    }
}
