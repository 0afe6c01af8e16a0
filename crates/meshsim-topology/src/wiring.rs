//! Two-phase neighbor selection.
//!
//! Phase A collects every pair that passes the link thresholds. Phase B walks
//! the nodes in ascending id order and lets each one try its
//! [`MAX_NEIGHBORS`] cheapest candidates; a try succeeds only if both ends are
//! still below the cap.
//!
//! Equal costs are ranked by peer id so the result is a pure function of the
//! inputs.

use std::collections::{BTreeMap, BTreeSet};

use crate::{LinkModel, NodeId, Placement, Topology, MAX_NEIGHBORS, MIN_WIRED_NODES};

/// Symmetric candidate relation produced by Phase A.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    by_node: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Candidates {
    fn insert(&mut self, a: NodeId, b: NodeId) {
        self.by_node.entry(a).or_default().insert(b);
        self.by_node.entry(b).or_default().insert(a);
    }

    /// Candidates of `id` in ascending id order.
    pub fn of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.by_node.get(&id).into_iter().flatten().copied()
    }

    pub fn contains(&self, a: NodeId, b: NodeId) -> bool {
        self.by_node.get(&a).is_some_and(|peers| peers.contains(&b))
    }

    /// Number of unordered candidate pairs.
    pub fn pair_count(&self) -> usize {
        self.by_node.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}

/// Phase A: every unordered pair that passes [`LinkModel::qualifies`].
pub fn candidates(sites: &[Placement], model: &LinkModel<'_>) -> Candidates {
    let mut result = Candidates::default();
    for (i, a) in sites.iter().enumerate() {
        for b in &sites[i + 1..] {
            if model.qualifies(a, b) {
                result.insert(a.id, b.id);
            }
        }
    }
    result
}

/// Build a fresh topology over `sites`.
///
/// Fewer than [`MIN_WIRED_NODES`] sites give an empty graph.
pub fn wire(sites: &[Placement], model: &LinkModel<'_>) -> Topology {
    if sites.len() < MIN_WIRED_NODES {
        return Topology::new();
    }

    let by_id: BTreeMap<NodeId, &Placement> = sites.iter().map(|site| (site.id, site)).collect();
    let candidates = candidates(sites, model);
    let mut topology = Topology::with_nodes(by_id.keys().copied());

    for (&id, site) in &by_id {
        let mut ranked: Vec<(f64, NodeId)> = candidates
            .of(id)
            .map(|peer| (model.cost(site, by_id[&peer]), peer))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (cost, peer) in ranked.into_iter().take(MAX_NEIGHBORS) {
            topology.connect(id, peer, cost, MAX_NEIGHBORS);
        }
    }

    topology
}
