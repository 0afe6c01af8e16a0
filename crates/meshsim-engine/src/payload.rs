//! Route and health payloads pushed to nodes.

use serde::{Deserialize, Serialize};

use crate::node::NodeInfo;

/// One routing table entry.
///
/// `via` is absent for a destination reached directly. `via` and `cost` are
/// both absent when the destination is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub dst: NodeInfo,
    pub via: Option<NodeInfo>,
    pub cost: Option<f64>,
}

/// Characteristics of the link to one wired neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerHealth {
    pub peer: NodeInfo,
    pub bandwidth: i64,
    pub latency: f64,
    pub jitter: i64,
    pub packet_loss: i64,
}

/// Traffic shaping for client connections into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHealth {
    pub source_port: u16,
    pub bandwidth: i64,
    pub latency: i64,
    pub jitter: i64,
    pub loss: i64,
}

/// Health payload for one node: its neighbor links and its client shaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    pub peers: Vec<PeerHealth>,
    pub clients: Vec<ClientHealth>,
}

/// Which payload a push carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    Routes,
    Health,
}

impl std::fmt::Display for PushKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Routes => write!(f, "routes"),
            Self::Health => write!(f, "health"),
        }
    }
}
