//! Engine events for live viewers.

use std::net::IpAddr;

use meshsim_topology::{LinkKey, NodeId, Position};
use serde::{Deserialize, Serialize};

use crate::payload::PushKind;

/// Something that happened in the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEvent {
    NodeAdded {
        node: NodeId,
        position: Position,
    },

    NodeStarted {
        node: NodeId,
        ip: IpAddr,
    },

    NodeMoved {
        node: NodeId,
        position: Position,
    },

    NodeRemoved {
        node: NodeId,
    },

    DefaultsChanged,

    LinkOverridden {
        a: NodeId,
        b: NodeId,
    },

    /// A new topology was published.
    RewireCompleted {
        generation: u64,
        nodes: usize,
        links: usize,
    },

    PushRetrying {
        node: NodeId,
        kind: PushKind,
        attempt: u32,
        reason: String,
    },

    PushDelivered {
        node: NodeId,
        kind: PushKind,
        attempts: u32,
    },
}

impl MeshEvent {
    pub fn link_overridden(link: LinkKey) -> Self {
        Self::LinkOverridden {
            a: link.low(),
            b: link.high(),
        }
    }

    /// Whether the event changes what a viewer should draw.
    pub fn changes_topology(&self) -> bool {
        !matches!(self, Self::PushRetrying { .. } | Self::PushDelivered { .. })
    }
}
