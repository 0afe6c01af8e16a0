//! Engine configuration.

use std::time::Duration;

/// How a rewire run waits on its per-node pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationMode {
    /// The run completes once every node acknowledged its routes and health.
    /// A node that never answers holds the run open until it is removed.
    #[default]
    AwaitAll,
    /// Pushes are spawned and retried in the background; the run returns as
    /// soon as they are started.
    Detached,
}

impl std::str::FromStr for PropagationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "await" | "await_all" => Ok(Self::AwaitAll),
            "detached" => Ok(Self::Detached),
            other => Err(format!("unknown propagation mode {other:?}")),
        }
    }
}

/// Configuration for a [`MeshEngine`](crate::MeshEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Host address handed to the provider when starting nodes.
    pub host: String,

    /// Fixed delay between push attempts to an unreachable node.
    pub retry_delay: Duration,

    /// Whether rewire runs wait for their pushes.
    pub propagation: PropagationMode,

    /// Buffered engine events per subscriber.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            retry_delay: Duration::from_secs(1),
            propagation: PropagationMode::AwaitAll,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Set the host address passed to node start.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the push retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the propagation mode.
    #[must_use]
    pub fn with_propagation(mut self, mode: PropagationMode) -> Self {
        self.propagation = mode;
        self
    }

    /// Create a config suited to tests: short retry delay, local host.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }
}
