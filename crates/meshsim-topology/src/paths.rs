//! All-pairs shortest paths over a wired topology.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use crate::{NodeId, Topology};

/// Shortest-path tree rooted at one source.
#[derive(Debug, Clone, Default, PartialEq)]
struct PathTree {
    cost: BTreeMap<NodeId, f64>,
    parent: BTreeMap<NodeId, NodeId>,
}

/// Heap entry ordered by cost, then node id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    cost: f64,
    node: NodeId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.node.cmp(&other.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PathTree {
    /// Dijkstra from `source`. A node's parent only changes on a strictly
    /// cheaper path, so the first-discovered path wins ties.
    fn grow(topology: &Topology, source: NodeId) -> Self {
        let mut tree = Self::default();
        let mut heap = BinaryHeap::new();

        tree.cost.insert(source, 0.0);
        heap.push(Reverse(Frontier { cost: 0.0, node: source }));

        while let Some(Reverse(Frontier { cost, node })) = heap.pop() {
            if tree.cost.get(&node).is_some_and(|&best| cost > best) {
                continue;
            }
            for peer in topology.neighbors(node) {
                let Some(weight) = topology.weight(node, peer) else {
                    continue;
                };
                let next = cost + weight;
                let improves = tree.cost.get(&peer).map_or(true, |&best| next < best);
                if improves {
                    tree.cost.insert(peer, next);
                    tree.parent.insert(peer, node);
                    heap.push(Reverse(Frontier { cost: next, node: peer }));
                }
            }
        }

        tree
    }
}

/// Next hops and costs between every pair of wired nodes.
///
/// Valid only for the topology it was computed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathCache {
    trees: BTreeMap<NodeId, PathTree>,
}

impl PathCache {
    pub fn compute(topology: &Topology) -> Self {
        Self {
            trees: topology
                .nodes()
                .map(|source| (source, PathTree::grow(topology, source)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.trees.contains_key(&id)
    }

    /// Total cost from `from` to `to`; `Some(0.0)` when they are equal.
    pub fn cost(&self, from: NodeId, to: NodeId) -> Option<f64> {
        self.trees.get(&from)?.cost.get(&to).copied()
    }

    /// Full path including both ends, or `None` if unreachable.
    pub fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let tree = self.trees.get(&from)?;
        tree.cost.get(&to)?;

        let mut path = vec![to];
        let mut current = to;
        while current != from {
            current = *tree.parent.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    /// First hop on the way from `from` to `to`.
    pub fn next_hop(&self, from: NodeId, to: NodeId) -> Option<NodeId> {
        if from == to {
            return None;
        }
        let tree = self.trees.get(&from)?;
        let mut current = to;
        loop {
            let parent = *tree.parent.get(&current)?;
            if parent == from {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Costs of every node reachable from `from`, including itself.
    pub fn costs_from(&self, from: NodeId) -> Option<&BTreeMap<NodeId, f64>> {
        self.trees.get(&from).map(|tree| &tree.cost)
    }

    pub fn all_costs(&self) -> BTreeMap<NodeId, BTreeMap<NodeId, f64>> {
        self.trees
            .iter()
            .map(|(source, tree)| (*source, tree.cost.clone()))
            .collect()
    }
}
