//! meshsim Topology
//!
//! Link-cost model, degree-capped neighbor selection and all-pairs shortest
//! paths for a simulated wireless mesh laid out on a 2D plane.
//!
//! # Link Model
//!
//! Every pair of started nodes has effective link characteristics derived from
//! the distance between them and a set of global defaults:
//! - latency grows with distance (scaled by `latency_scale`)
//! - bandwidth optionally decays linearly to zero at `max_latency`
//! - jitter and packet loss are flat defaults
//!
//! Any of the four can be pinned per link through the [`OverrideStore`].
//!
//! # Two-Phase Wiring
//!
//! 1. **Candidacy**: every pair under the latency ceiling and above the
//!    bandwidth floor becomes a candidate link.
//! 2. **Selection**: each node (ascending id) tries its
//!    [`MAX_NEIGHBORS`] cheapest candidates; a link is confirmed only when
//!    both ends still have a free slot.
//!
//! Candidacy has to be complete before selection starts, since the degree cap
//! makes a node's links depend on its global rank among everyone's candidates.
//!
//! # Example
//!
//! ```
//! use meshsim_topology::{wire, LinkDefaults, LinkModel, NodeId, OverrideStore, PathCache, Placement};
//!
//! let sites = [
//!     Placement::new(NodeId(0), 0.0, 0.0),
//!     Placement::new(NodeId(1), 50.0, 0.0),
//!     Placement::new(NodeId(2), 200.0, 0.0),
//! ];
//! let defaults = LinkDefaults::default();
//! let overrides = OverrideStore::new();
//! let model = LinkModel::new(&defaults, &overrides);
//!
//! let topology = wire(&sites, &model);
//! let paths = PathCache::compute(&topology);
//!
//! assert_eq!(topology.edge_count(), 3);
//! assert_eq!(paths.path(NodeId(0), NodeId(2)), Some(vec![NodeId(0), NodeId(2)]));
//! ```

mod error;
mod geometry;
mod graph;
mod link;
mod overrides;
mod paths;
mod wiring;

pub use error::{Result, TopologyError};
pub use geometry::{LinkKey, NodeId, Placement, Position};
pub use graph::Topology;
pub use link::{CostFunction, DefaultsPatch, LinkDefaults, LinkModel, LinkParams};
pub use overrides::{LinkField, LinkOverride, OverrideStore};
pub use paths::PathCache;
pub use wiring::{candidates, wire, Candidates};

/// Maximum confirmed neighbors per node (enforced on both ends of a link).
pub const MAX_NEIGHBORS: usize = 4;

/// Fewer started nodes than this produce an empty topology.
pub const MIN_WIRED_NODES: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_is_degenerate() {
        let defaults = LinkDefaults::default();
        let overrides = OverrideStore::new();
        let model = LinkModel::new(&defaults, &overrides);

        let topology = wire(&[Placement::new(NodeId(7), 1.0, 1.0)], &model);
        assert!(topology.is_empty());
        assert!(PathCache::compute(&topology).is_empty());
    }
}
