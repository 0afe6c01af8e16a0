//! Node providers selectable at startup.

mod script;
mod scripts;
mod synapse;

use std::sync::Arc;

use meshsim_engine::{MemoryProvider, NodeProvider};
use tracing::{info, warn};

pub use script::ScriptProvider;
pub use scripts::{ScriptError, Scripts};
pub use synapse::SynapseProvider;

use crate::config::ServerConfig;

/// Which kind of node the simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Synapse,
    Libp2p,
    /// In-process nodes, for dry runs.
    Memory,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synapse" => Ok(Self::Synapse),
            "libp2p" => Ok(Self::Libp2p),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown provider {other:?}")),
        }
    }
}

/// A provider plus the host-level scripts that bracket its lifetime.
pub struct Provisioned {
    pub provider: Arc<dyn NodeProvider>,
    host_scripts: Option<Scripts>,
}

impl Provisioned {
    pub fn build(config: &ServerConfig) -> Self {
        let scripts = Some(Scripts::new(config.scripts_dir.clone()));
        let (provider, host_scripts): (Arc<dyn NodeProvider>, _) = match config.provider {
            ProviderKind::Synapse => (Arc::new(SynapseProvider::new(config)), scripts),
            ProviderKind::Libp2p => (
                Arc::new(ScriptProvider::new(config, "libp2p/start_node.sh", "meshsim-node")),
                scripts,
            ),
            ProviderKind::Memory => (Arc::new(MemoryProvider::new()), None),
        };
        Self {
            provider,
            host_scripts,
        }
    }

    /// Prepare the shared client host.
    pub async fn init(&self) {
        self.run_host_script("init_client_health_host.sh").await;
    }

    /// Stop and remove every node container.
    pub async fn cleanup(&self) {
        self.run_host_script("stop_clean_all.sh").await;
    }

    async fn run_host_script(&self, name: &str) {
        let Some(scripts) = &self.host_scripts else {
            return;
        };
        match scripts.run(name, &[]).await {
            Ok(out) => info!(script = name, result = %out, "Host script finished"),
            Err(e) => warn!(script = name, error = %e, "Host script failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses() {
        assert_eq!("synapse".parse::<ProviderKind>(), Ok(ProviderKind::Synapse));
        assert_eq!("libp2p".parse::<ProviderKind>(), Ok(ProviderKind::Libp2p));
        assert_eq!("memory".parse::<ProviderKind>(), Ok(ProviderKind::Memory));
        assert!("docker".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn hostnames_follow_the_provider() {
        let mut config = ServerConfig::default();
        let synapse = Provisioned::build(&config);
        assert_eq!(synapse.provider.hostname(meshsim_engine::NodeId(4)), "synapse4");

        config.provider = ProviderKind::Libp2p;
        let libp2p = Provisioned::build(&config);
        assert_eq!(libp2p.provider.hostname(meshsim_engine::NodeId(4)), "meshsim-node4");
    }

    #[tokio::test]
    async fn memory_provider_skips_host_scripts() {
        let config = ServerConfig {
            provider: ProviderKind::Memory,
            ..Default::default()
        };
        let provisioned = Provisioned::build(&config);
        provisioned.init().await;
        provisioned.cleanup().await;
    }
}
