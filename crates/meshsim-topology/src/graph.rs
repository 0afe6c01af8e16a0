//! Undirected weighted mesh graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::{LinkKey, NodeId};

/// Confirmed links between started nodes.
///
/// Built from scratch by every rewire and never patched afterwards. The
/// neighbor relation is symmetric by construction: [`Topology::connect`]
/// writes both adjacency entries and the edge weight together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    weights: BTreeMap<LinkKey, f64>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph containing `ids` and no edges.
    pub fn with_nodes(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            adjacency: ids.into_iter().map(|id| (id, BTreeSet::new())).collect(),
            weights: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.adjacency.entry(id).or_default();
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.adjacency.contains_key(&id)
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    /// Neighbors of `id` in ascending id order.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    pub fn are_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.weights.contains_key(&LinkKey::new(a, b))
    }

    /// Confirm a link, subject to a degree cap on both ends.
    ///
    /// Returns `false` without changing anything when the ends are equal,
    /// either end is unknown, the link already exists, or either end is full.
    pub fn connect(&mut self, a: NodeId, b: NodeId, weight: f64, cap: usize) -> bool {
        if a == b || !self.contains_node(a) || !self.contains_node(b) {
            return false;
        }
        if self.are_connected(a, b) || self.degree(a) >= cap || self.degree(b) >= cap {
            return false;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        self.weights.insert(LinkKey::new(a, b), weight);
        true
    }

    pub fn weight(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.weights.get(&LinkKey::new(a, b)).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.keys().copied()
    }

    /// Every edge once, ordered by key.
    pub fn edges(&self) -> impl Iterator<Item = (LinkKey, f64)> + '_ {
        self.weights.iter().map(|(key, weight)| (*key, *weight))
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}
