//! Nodes run as containers managed by shell scripts.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use meshsim_engine::{
    ClientHealth, Error, HealthPayload, NodeAddress, NodeId, NodeProvider, Result, RouteEntry,
};
use tracing::{debug, info};

use super::scripts::Scripts;
use crate::config::ServerConfig;
use crate::http::JsonClient;

/// Starts nodes with a provider-specific script and configures them over HTTP.
pub struct ScriptProvider {
    scripts: Scripts,
    start_script: PathBuf,
    client: JsonClient,
    node_port_base: u16,
    hostname_prefix: &'static str,
}

impl ScriptProvider {
    /// `start_script` is relative to the scripts directory.
    pub fn new(
        config: &ServerConfig,
        start_script: impl Into<PathBuf>,
        hostname_prefix: &'static str,
    ) -> Self {
        Self {
            scripts: Scripts::new(config.scripts_dir.clone()),
            start_script: start_script.into(),
            client: JsonClient::new(config.push_timeout),
            node_port_base: config.node_port_base,
            hostname_prefix,
        }
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub fn client(&self) -> &JsonClient {
        &self.client
    }

    fn node_url(&self, id: NodeId, endpoint: &str) -> Result<String> {
        let port = port_for(self.node_port_base, id)?;
        Ok(format!("http://localhost:{port}/{endpoint}"))
    }

    async fn query(&self, script: &str, id: NodeId) -> Result<String> {
        self.scripts
            .run(script, &[id.to_string()])
            .await
            .map_err(|e| Error::unavailable(id, e))
    }
}

/// Port `base + id`, if it fits.
pub(crate) fn port_for(base: u16, id: NodeId) -> Result<u16> {
    u64::from(base)
        .checked_add(id.0)
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| Error::unavailable(id, format!("no port for base {base}")))
}

#[async_trait]
impl NodeProvider for ScriptProvider {
    async fn start(&self, id: NodeId, host: &str) -> Result<NodeAddress> {
        let start = self.start_script.to_string_lossy();
        self.scripts
            .run(&start, &[id.to_string(), host.to_string()])
            .await
            .map_err(|e| Error::unavailable(id, e))?;

        let ip: IpAddr = self
            .query("get_hs_ip.sh", id)
            .await?
            .parse()
            .map_err(|e| Error::unavailable(id, format!("bad ip: {e}")))?;
        let mac = self.query("get_hs_mac.sh", id).await?;
        Ok(NodeAddress { ip, mac })
    }

    async fn stop(&self, id: NodeId) -> Result<()> {
        self.query("stop_hs.sh", id).await.map(|_| ())
    }

    async fn push_routes(&self, id: NodeId, routes: &[RouteEntry]) -> Result<String> {
        let url = self.node_url(id, "routes")?;
        debug!(node = %id, routes = routes.len(), "Setting routes");
        self.client
            .put(&url, routes)
            .await
            .map_err(|e| Error::unavailable(id, e))
    }

    async fn push_health(&self, id: NodeId, health: &HealthPayload) -> Result<String> {
        let url = self.node_url(id, "health")?;
        debug!(node = %id, peers = health.peers.len(), "Setting health");
        self.client
            .put(&url, health)
            .await
            .map_err(|e| Error::unavailable(id, e))
    }

    async fn set_client_health(&self, clients: &[ClientHealth]) -> Result<()> {
        for client in clients {
            let args = [
                client.source_port.to_string(),
                client.bandwidth.to_string(),
                client.latency.to_string(),
                client.jitter.to_string(),
            ];
            let out = self
                .scripts
                .run("set_client_health_host.sh", &args)
                .await
                .map_err(|e| Error::Provider(e.to_string()))?;
            info!(port = client.source_port, result = %out, "Client host health set");
        }
        Ok(())
    }

    async fn bootstrap(&self, _nodes: &[NodeId]) -> Result<()> {
        Ok(())
    }

    async fn send_message(&self, _id: NodeId, _message: &str) -> Result<()> {
        Err(Error::Unsupported("messaging"))
    }

    fn hostname(&self, id: NodeId) -> String {
        format!("{}{id}", self.hostname_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_are_offset_by_id() {
        assert_eq!(port_for(19000, NodeId(7)).unwrap(), 19007);
        assert!(port_for(65000, NodeId(1000)).is_err());
        assert!(port_for(19000, NodeId(u64::MAX)).is_err());
    }

    #[test]
    fn node_urls_use_the_control_port() {
        let provider = ScriptProvider::new(&ServerConfig::default(), "libp2p/start_node.sh", "meshsim-node");
        assert_eq!(
            provider.node_url(NodeId(3), "routes").unwrap(),
            "http://localhost:19003/routes"
        );
        assert_eq!(provider.hostname(NodeId(3)), "meshsim-node3");
    }

    #[tokio::test]
    async fn messaging_is_unsupported() {
        let provider = ScriptProvider::new(&ServerConfig::default(), "libp2p/start_node.sh", "meshsim-node");
        assert!(matches!(
            provider.send_message(NodeId(0), "hi").await,
            Err(Error::Unsupported(_))
        ));
        assert!(provider.bootstrap(&[NodeId(0)]).await.is_ok());
    }

    #[tokio::test]
    async fn push_to_a_dead_node_is_unavailable() {
        let config = ServerConfig {
            node_port_base: 9,
            push_timeout: std::time::Duration::from_secs(5),
            ..Default::default()
        };
        let provider = ScriptProvider::new(&config, "libp2p/start_node.sh", "meshsim-node");
        let err = provider.push_routes(NodeId(0), &[]).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable { node: NodeId(0), .. }));
    }
}
