//! Error types for meshsim-topology.

use thiserror::Error;

use crate::{LinkField, NodeId};

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// A request that would leave the topology inputs malformed.
///
/// Every variant is raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// No node with this id exists.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Both ends of a link are the same node.
    #[error("node {0} cannot link to itself")]
    SelfLink(NodeId),

    /// Coordinates must be finite.
    #[error("position ({x}, {y}) is not finite")]
    InvalidPosition { x: f64, y: f64 },

    /// Override value outside the field's range.
    #[error("{field} override of {value} is out of range")]
    InvalidOverride { field: LinkField, value: i64 },

    /// Global default outside its range.
    #[error("invalid default {name}: {reason}")]
    InvalidDefault {
        name: &'static str,
        reason: &'static str,
    },
}
