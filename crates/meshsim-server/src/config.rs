//! Server configuration from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use meshsim_engine::{EngineConfig, PropagationMode};
use thiserror::Error;

use crate::provider::ProviderKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}={value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the `meshsim` binary needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Host address handed to node start scripts.
    pub host: String,
    pub api_addr: SocketAddr,
    pub provider: ProviderKind,
    pub scripts_dir: PathBuf,
    /// Node control port is `node_port_base + id`.
    pub node_port_base: u16,
    /// Synapse client API port is `client_port_base + id`.
    pub client_port_base: u16,
    pub retry_delay: Duration,
    pub push_timeout: Duration,
    pub propagation: PropagationMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            api_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            provider: ProviderKind::Synapse,
            scripts_dir: PathBuf::from("./scripts"),
            node_port_base: 19000,
            client_port_base: 18000,
            retry_delay: Duration::from_secs(1),
            push_timeout: Duration::from_secs(30),
            propagation: PropagationMode::AwaitAll,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// The first positional argument, if any, overrides `MESHSIM_HOST`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), std::env::args().nth(1))
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        host_arg: Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = host_arg
            .or_else(|| lookup("MESHSIM_HOST"))
            .unwrap_or(defaults.host);

        Ok(Self {
            host,
            api_addr: parse(&lookup, "MESHSIM_API_ADDR")?.unwrap_or(defaults.api_addr),
            provider: parse(&lookup, "MESHSIM_PROVIDER")?.unwrap_or(defaults.provider),
            scripts_dir: lookup("MESHSIM_SCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scripts_dir),
            node_port_base: parse(&lookup, "MESHSIM_NODE_PORT_BASE")?
                .unwrap_or(defaults.node_port_base),
            client_port_base: parse(&lookup, "MESHSIM_CLIENT_PORT_BASE")?
                .unwrap_or(defaults.client_port_base),
            retry_delay: parse(&lookup, "MESHSIM_RETRY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            push_timeout: parse(&lookup, "MESHSIM_PUSH_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.push_timeout),
            propagation: parse(&lookup, "MESHSIM_PROPAGATION")?.unwrap_or(defaults.propagation),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_host(self.host.clone())
            .with_retry_delay(self.retry_delay)
            .with_propagation(self.propagation)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
