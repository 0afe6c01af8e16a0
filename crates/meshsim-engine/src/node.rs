//! Simulated nodes and their network identity.

use std::net::IpAddr;

use meshsim_topology::{NodeId, Placement, Position};
use serde::{Deserialize, Serialize};

/// Network identity assigned to a node once its process is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub ip: IpAddr,
    pub mac: String,
}

/// A node in the simulation.
///
/// A node without an address is still starting and takes no part in wiring.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub address: Option<NodeAddress>,
}

impl Node {
    pub fn new(id: NodeId, position: Position) -> Self {
        Self {
            id,
            position,
            address: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.address.is_some()
    }

    /// Placement for wiring, only once started.
    pub fn placement(&self) -> Option<Placement> {
        self.address
            .as_ref()
            .map(|_| Placement::new(self.id, self.position.x, self.position.y))
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id,
            ip: self.address.as_ref().map(|a| a.ip),
            mac: self.address.as_ref().map(|a| a.mac.clone()),
        }
    }
}

/// Wire form of a node reference inside route and health payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub ip: Option<IpAddr>,
    pub mac: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn unstarted_node_has_no_placement() {
        let mut node = Node::new(NodeId(3), Position { x: 1.0, y: 2.0 });
        assert!(!node.is_started());
        assert_eq!(node.placement(), None);

        node.address = Some(NodeAddress {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            mac: "02:00:00:00:00:03".into(),
        });
        assert_eq!(node.placement(), Some(Placement::new(NodeId(3), 1.0, 2.0)));
    }

    #[test]
    fn info_serializes_flat() {
        let node = Node {
            id: NodeId(7),
            position: Position::ORIGIN,
            address: Some(NodeAddress {
                ip: IpAddr::V4(Ipv4Addr::new(172, 18, 0, 7)),
                mac: "aa:bb:cc:dd:ee:07".into(),
            }),
        };
        let json = serde_json::to_value(node.info()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 7, "ip": "172.18.0.7", "mac": "aa:bb:cc:dd:ee:07"})
        );
    }
}
