//! meshsim engine - debounced rewiring and reliable propagation
//!
//! This crate owns the simulated mesh: the node table, the link defaults and
//! per-link overrides, and the last published topology. Every mutation asks
//! for a rewire; the engine wires the started nodes, publishes the result
//! atomically and pushes each node its routing table and neighbor health
//! through a [`NodeProvider`].
//!
//! # Overview
//!
//! ## Rewire debounce
//!
//! At most one rewire runs at a time. Requests arriving meanwhile collapse
//! into a single follow-up run, so a burst of edits costs at most two runs.
//! While a node is starting, requests are deferred and the starter rewires
//! once it has an address.
//!
//! ## Propagation
//!
//! Routes and health are pushed per node and retried with a fixed delay
//! until acknowledged. A newer push to a node aborts the older one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshsim_engine::{EngineConfig, MemoryProvider, MeshEngine};
//!
//! # async fn demo() -> meshsim_engine::Result<()> {
//! let engine = MeshEngine::new(Arc::new(MemoryProvider::new()), EngineConfig::default());
//! let a = engine.add_node(0.0, 0.0).await?;
//! let b = engine.add_node(100.0, 0.0).await?;
//! assert_eq!(engine.path(a, b)?, Some(vec![a, b]));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod node;
pub mod payload;
pub mod provider;
pub mod state;

mod propagation;

pub use config::{EngineConfig, PropagationMode};
pub use debounce::RewireState;
pub use engine::{MeshEngine, RewireDeferral, RewireOutcome};
pub use error::{Error, Result};
pub use events::MeshEvent;
pub use memory::MemoryProvider;
pub use node::{Node, NodeAddress, NodeInfo};
pub use payload::{ClientHealth, HealthPayload, PeerHealth, PushKind, RouteEntry};
pub use provider::NodeProvider;
pub use state::{LinkView, MeshState, NodeView, TopologyView};

// Re-export the topology types that appear in the engine API
pub use meshsim_topology::{
    CostFunction, DefaultsPatch, LinkDefaults, LinkField, LinkOverride, NodeId, Position,
    TopologyError,
};
