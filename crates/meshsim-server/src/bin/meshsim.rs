//! meshsim control server
//!
//! Usage: `meshsim [host]`. Everything else comes from `MESHSIM_*` variables.

use meshsim_server::{MeshServer, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshsim=info,meshsim_server=info,meshsim_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        provider = ?config.provider,
        propagation = ?config.propagation,
        "Starting meshsim"
    );

    let server = MeshServer::new(&config);
    server.serve(config.api_addr, shutdown_signal()).await?;

    tracing::info!("meshsim stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
