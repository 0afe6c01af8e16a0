//! meshsim server
//!
//! Control API and live event stream for the meshsim mesh simulator.
//!
//! # Architecture
//!
//! - **Providers**: start node containers through shell scripts and configure
//!   them over HTTP (Synapse or libp2p), or run nodes in memory
//! - **REST API**: add, move and remove nodes, tune links, query paths
//! - **WebSocket**: streams engine and traffic events to viewers
//!
//! # Usage
//!
//! ```ignore
//! let config = ServerConfig::from_env()?;
//! let server = MeshServer::new(&config);
//! server.serve(config.api_addr, shutdown_signal()).await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod traffic;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use meshsim_engine::MeshEngine;

pub use api::AppState;
pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use provider::{ProviderKind, Provisioned};
pub use traffic::TrafficEvent;

/// The engine, its provider and the API serving them.
pub struct MeshServer {
    provisioned: Provisioned,
    state: Arc<AppState>,
}

impl MeshServer {
    pub fn new(config: &ServerConfig) -> Self {
        let provisioned = Provisioned::build(config);
        let engine = MeshEngine::new(Arc::clone(&provisioned.provider), config.engine_config());
        Self {
            provisioned,
            state: AppState::new(engine),
        }
    }

    pub fn engine(&self) -> &MeshEngine {
        &self.state.engine
    }

    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.state))
    }

    /// Serve until `shutdown` resolves, then stop propagation and clean up nodes.
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        self.provisioned.init().await;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("meshsim API listening on http://{}", listener.local_addr()?);
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        self.engine().shutdown();
        self.provisioned.cleanup().await;
        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_server_builds() {
        let config = ServerConfig {
            provider: ProviderKind::Memory,
            ..Default::default()
        };
        let server = MeshServer::new(&config);
        let _router = server.router();
        assert!(server.engine().nodes().is_empty());
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let config = ServerConfig {
            provider: ProviderKind::Memory,
            ..Default::default()
        };
        let server = MeshServer::new(&config);
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        server.serve(addr, async {}).await.unwrap();
    }
}
