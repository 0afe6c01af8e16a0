//! In-process provider that records what the engine pushes.
//!
//! Used for tests and for running the API without containers. Pushes can be
//! held behind a gate or made to fail a number of times per node.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use meshsim_topology::NodeId;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::node::NodeAddress;
use crate::payload::{ClientHealth, HealthPayload, PushKind, RouteEntry};
use crate::provider::NodeProvider;

#[derive(Debug, Default)]
struct Record {
    running: BTreeSet<NodeId>,
    stopped: Vec<NodeId>,
    routes: BTreeMap<NodeId, Vec<RouteEntry>>,
    health: BTreeMap<NodeId, HealthPayload>,
    attempts: BTreeMap<(NodeId, PushKind), usize>,
    failures: BTreeMap<(NodeId, PushKind), usize>,
    client_health: Vec<Vec<ClientHealth>>,
    bootstrapped: Vec<Vec<NodeId>>,
    messages: Vec<(NodeId, String)>,
    fail_next_start: bool,
}

pub struct MemoryProvider {
    record: Mutex<Record>,
    gate: watch::Sender<bool>,
    client_gate: watch::Sender<bool>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        let (client_gate, _) = watch::channel(true);
        Self {
            record: Mutex::new(Record::default()),
            gate,
            client_gate,
        }
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address handed out for `id`.
    pub fn address_of(id: NodeId) -> NodeAddress {
        let [.., hi, lo] = id.0.to_be_bytes();
        NodeAddress {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, hi, lo)),
            mac: format!("02:00:00:00:{hi:02x}:{lo:02x}"),
        }
    }

    /// Hold every push until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Hold client health calls, after recording them, until released.
    pub fn hold_client_health(&self) {
        self.client_gate.send_replace(false);
    }

    pub fn release_client_health(&self) {
        self.client_gate.send_replace(true);
    }

    /// Fail the next `count` attempts of each push kind to `id`.
    pub fn fail_pushes(&self, id: NodeId, count: usize) {
        let mut record = self.record();
        record.failures.insert((id, PushKind::Routes), count);
        record.failures.insert((id, PushKind::Health), count);
    }

    pub fn fail_next_start(&self) {
        self.record().fail_next_start = true;
    }

    pub fn is_running(&self, id: NodeId) -> bool {
        self.record().running.contains(&id)
    }

    pub fn stopped(&self) -> Vec<NodeId> {
        self.record().stopped.clone()
    }

    pub fn routes(&self, id: NodeId) -> Option<Vec<RouteEntry>> {
        self.record().routes.get(&id).cloned()
    }

    pub fn health(&self, id: NodeId) -> Option<HealthPayload> {
        self.record().health.get(&id).cloned()
    }

    /// Attempts made so far, successful or not.
    pub fn attempts(&self, id: NodeId, kind: PushKind) -> usize {
        self.record().attempts.get(&(id, kind)).copied().unwrap_or(0)
    }

    /// One entry per client shaping call.
    pub fn client_health_calls(&self) -> Vec<Vec<ClientHealth>> {
        self.record().client_health.clone()
    }

    pub fn bootstraps(&self) -> Vec<Vec<NodeId>> {
        self.record().bootstrapped.clone()
    }

    pub fn messages(&self) -> Vec<(NodeId, String)> {
        self.record().messages.clone()
    }

    async fn wait_open(&self) {
        wait_for_open(&self.gate).await;
    }

    fn attempt(&self, id: NodeId, kind: PushKind) -> Result<()> {
        let mut record = self.record();
        *record.attempts.entry((id, kind)).or_default() += 1;
        if !record.running.contains(&id) {
            return Err(Error::unavailable(id, "not running"));
        }
        if let Some(remaining) = record.failures.get_mut(&(id, kind)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::unavailable(id, "injected failure"));
            }
        }
        Ok(())
    }
}

async fn wait_for_open(gate: &watch::Sender<bool>) {
    let mut open = gate.subscribe();
    // The sender outlives the wait, so this only ends when open.
    let _ = open.wait_for(|open| *open).await;
}

#[async_trait]
impl NodeProvider for MemoryProvider {
    async fn start(&self, id: NodeId, _host: &str) -> Result<NodeAddress> {
        let mut record = self.record();
        if std::mem::take(&mut record.fail_next_start) {
            return Err(Error::unavailable(id, "start failed"));
        }
        record.running.insert(id);
        Ok(Self::address_of(id))
    }

    async fn stop(&self, id: NodeId) -> Result<()> {
        let mut record = self.record();
        if !record.running.remove(&id) {
            return Err(Error::unavailable(id, "not running"));
        }
        record.stopped.push(id);
        Ok(())
    }

    async fn push_routes(&self, id: NodeId, routes: &[RouteEntry]) -> Result<String> {
        self.wait_open().await;
        self.attempt(id, PushKind::Routes)?;
        self.record().routes.insert(id, routes.to_vec());
        Ok("{}".to_string())
    }

    async fn push_health(&self, id: NodeId, health: &HealthPayload) -> Result<String> {
        self.wait_open().await;
        self.attempt(id, PushKind::Health)?;
        self.record().health.insert(id, health.clone());
        Ok("{}".to_string())
    }

    async fn set_client_health(&self, clients: &[ClientHealth]) -> Result<()> {
        self.record().client_health.push(clients.to_vec());
        wait_for_open(&self.client_gate).await;
        Ok(())
    }

    async fn bootstrap(&self, nodes: &[NodeId]) -> Result<()> {
        self.record().bootstrapped.push(nodes.to_vec());
        Ok(())
    }

    async fn send_message(&self, id: NodeId, message: &str) -> Result<()> {
        let mut record = self.record();
        if !record.running.contains(&id) {
            return Err(Error::unavailable(id, "not running"));
        }
        record.messages.push((id, message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_unique_per_id() {
        let a = MemoryProvider::address_of(NodeId(1));
        let b = MemoryProvider::address_of(NodeId(257));
        assert_eq!(a.ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(b.ip, IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(b.mac, "02:00:00:00:01:01");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let provider = MemoryProvider::new();
        provider.start(NodeId(0), "127.0.0.1").await.unwrap();
        provider.fail_pushes(NodeId(0), 2);

        assert!(provider.push_routes(NodeId(0), &[]).await.is_err());
        assert!(provider.push_routes(NodeId(0), &[]).await.is_err());
        assert!(provider.push_routes(NodeId(0), &[]).await.is_ok());
        assert_eq!(provider.attempts(NodeId(0), PushKind::Routes), 3);
        assert_eq!(provider.attempts(NodeId(0), PushKind::Health), 0);
    }

    #[tokio::test]
    async fn pushes_to_stopped_nodes_fail() {
        let provider = MemoryProvider::new();
        provider.start(NodeId(0), "127.0.0.1").await.unwrap();
        provider.stop(NodeId(0)).await.unwrap();

        assert!(provider.push_health(NodeId(0), &HealthPayload::default()).await.is_err());
        assert!(provider.stop(NodeId(0)).await.is_err());
        assert_eq!(provider.stopped(), vec![NodeId(0)]);
    }

    #[tokio::test]
    async fn fail_next_start_applies_once() {
        let provider = MemoryProvider::new();
        provider.fail_next_start();
        assert!(provider.start(NodeId(0), "127.0.0.1").await.is_err());
        assert!(provider.start(NodeId(1), "127.0.0.1").await.is_ok());
        assert!(!provider.is_running(NodeId(0)));
        assert!(provider.is_running(NodeId(1)));
    }
}
