//! The seam between the engine and whatever runs the simulated nodes.

use async_trait::async_trait;
use meshsim_topology::NodeId;

use crate::error::Result;
use crate::node::NodeAddress;
use crate::payload::{ClientHealth, HealthPayload, RouteEntry};

/// Starts, stops and configures node processes.
///
/// Push methods return the node's acknowledgement body. Any error is treated
/// as transient and retried by the engine.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// Start the process for `id` and report its address.
    async fn start(&self, id: NodeId, host: &str) -> Result<NodeAddress>;

    async fn stop(&self, id: NodeId) -> Result<()>;

    async fn push_routes(&self, id: NodeId, routes: &[RouteEntry]) -> Result<String>;

    async fn push_health(&self, id: NodeId, health: &HealthPayload) -> Result<String>;

    /// Apply client shaping on the shared client host. Called once per rewire.
    async fn set_client_health(&self, clients: &[ClientHealth]) -> Result<()>;

    /// Prepare the mesh for traffic, e.g. create and join a shared room.
    async fn bootstrap(&self, nodes: &[NodeId]) -> Result<()>;

    async fn send_message(&self, id: NodeId, message: &str) -> Result<()>;

    /// Name the node is known by on the network.
    fn hostname(&self, id: NodeId) -> String {
        format!("meshsim-node{id}")
    }
}
