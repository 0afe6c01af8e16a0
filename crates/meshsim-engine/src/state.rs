//! Published result of a rewire run and the payloads derived from it.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use meshsim_topology::{
    wire, LinkDefaults, LinkField, LinkModel, LinkParams, NodeId, OverrideStore, PathCache,
    Placement, Topology, MIN_WIRED_NODES,
};
use serde::Serialize;

use crate::node::Node;
use crate::payload::{ClientHealth, HealthPayload, PeerHealth, RouteEntry};

/// Everything one rewire run computed, published atomically.
///
/// Readers hold an `Arc` to a complete state; a new run replaces it whole.
#[derive(Debug, Clone, Default)]
pub struct MeshState {
    /// Zero until the first run completes.
    pub generation: u64,
    /// Started nodes that took part in the run.
    pub nodes: BTreeMap<NodeId, Node>,
    pub defaults: Arc<LinkDefaults>,
    pub overrides: OverrideStore,
    pub topology: Topology,
    pub paths: PathCache,
}

impl MeshState {
    /// Wire `nodes` and compute their shortest paths.
    pub fn build(
        generation: u64,
        nodes: BTreeMap<NodeId, Node>,
        defaults: Arc<LinkDefaults>,
        overrides: OverrideStore,
    ) -> Self {
        let sites: Vec<Placement> = nodes.values().filter_map(Node::placement).collect();
        let nodes: BTreeMap<NodeId, Node> = nodes
            .into_iter()
            .filter(|(_, node)| node.is_started())
            .collect();

        let (topology, paths) = if sites.len() < MIN_WIRED_NODES {
            (Topology::with_nodes(nodes.keys().copied()), PathCache::default())
        } else {
            let topology = wire(&sites, &LinkModel::new(&defaults, &overrides));
            let paths = PathCache::compute(&topology);
            (topology, paths)
        };

        Self {
            generation,
            nodes,
            defaults,
            overrides,
            topology,
            paths,
        }
    }

    /// Whether a run has completed.
    pub fn is_wired(&self) -> bool {
        self.generation > 0
    }

    /// Whether this state should be pushed to nodes.
    pub fn is_routable(&self) -> bool {
        self.nodes.len() >= MIN_WIRED_NODES
    }

    pub fn model(&self) -> LinkModel<'_> {
        LinkModel::new(&self.defaults, &self.overrides)
    }

    fn placement(&self, id: NodeId) -> Option<Placement> {
        self.nodes.get(&id).and_then(Node::placement)
    }

    /// Effective characteristics between two participating nodes.
    pub fn link_params(&self, a: NodeId, b: NodeId) -> Option<LinkParams> {
        let a = self.placement(a)?;
        let b = self.placement(b)?;
        Some(self.model().params(&a, &b))
    }

    /// Routing table for `source`: one entry per other participating node.
    pub fn routing_table(&self, source: NodeId) -> Vec<RouteEntry> {
        self.nodes
            .values()
            .filter(|dst| dst.id != source)
            .map(|dst| {
                let cost = self.paths.cost(source, dst.id);
                let via = self
                    .paths
                    .next_hop(source, dst.id)
                    .filter(|hop| *hop != dst.id)
                    .and_then(|hop| self.nodes.get(&hop))
                    .map(Node::info);
                RouteEntry {
                    dst: dst.info(),
                    via,
                    cost,
                }
            })
            .collect()
    }

    /// Health payload for `source`: one entry per wired neighbor.
    pub fn health_payload(&self, source: NodeId) -> HealthPayload {
        let peers = self
            .topology
            .neighbors(source)
            .filter_map(|peer| {
                let params = self.link_params(source, peer)?;
                let info = self.nodes.get(&peer)?.info();
                Some(PeerHealth {
                    peer: info,
                    bandwidth: params.bandwidth,
                    latency: params.latency,
                    jitter: params.jitter,
                    packet_loss: params.packet_loss,
                })
            })
            .collect();

        HealthPayload {
            peers,
            clients: self.client_health(),
        }
    }

    /// Client shaping for the default client port.
    pub fn client_health(&self) -> Vec<ClientHealth> {
        let defaults = &self.defaults;
        vec![ClientHealth {
            source_port: 0,
            bandwidth: defaults.client_bandwidth,
            latency: defaults.client_latency,
            jitter: defaults.client_jitter,
            loss: defaults.client_loss,
        }]
    }
}

/// A node as drawn by a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub ip: Option<IpAddr>,
    pub mac: Option<String>,
    pub neighbors: Vec<NodeId>,
}

/// A wired link with its effective characteristics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkView {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(flatten)]
    pub params: LinkParams,
    /// Fields whose value comes from an override.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overridden: Vec<LinkField>,
}

/// Current nodes plus the links of the last published run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyView {
    pub generation: u64,
    pub nodes: Vec<NodeView>,
    pub links: Vec<LinkView>,
}

impl TopologyView {
    /// `nodes` is the live node table; links come from `state`.
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a Node>, state: &MeshState) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| NodeView {
                id: node.id,
                x: node.position.x,
                y: node.position.y,
                ip: node.address.as_ref().map(|a| a.ip),
                mac: node.address.as_ref().map(|a| a.mac.clone()),
                neighbors: state.topology.neighbors(node.id).collect(),
            })
            .collect();

        let links = state
            .topology
            .edges()
            .filter_map(|(key, _)| {
                let params = state.link_params(key.low(), key.high())?;
                let overridden = state
                    .overrides
                    .get(key.low(), key.high())
                    .map(|o| o.active_fields().collect())
                    .unwrap_or_default();
                Some(LinkView {
                    source: key.low(),
                    target: key.high(),
                    params,
                    overridden,
                })
            })
            .collect();

        Self {
            generation: state.generation,
            nodes,
            links,
        }
    }
}
