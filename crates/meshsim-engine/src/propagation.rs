//! Reliable delivery of routes and health to every node.
//!
//! Each node gets one task per run that pushes routes and health
//! concurrently, retrying each with a fixed delay until it is acknowledged.
//! Starting a push for a node aborts the previous one still in flight, so a
//! node never receives an older table after a newer one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use meshsim_topology::NodeId;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::PropagationMode;
use crate::events::MeshEvent;
use crate::payload::{HealthPayload, PushKind, RouteEntry};
use crate::provider::NodeProvider;
use crate::state::MeshState;

pub(crate) struct Propagator {
    provider: Arc<dyn NodeProvider>,
    retry_delay: Duration,
    mode: PropagationMode,
    events: broadcast::Sender<MeshEvent>,
    pushes: Mutex<Pushes>,
}

#[derive(Default)]
struct Pushes {
    in_flight: HashMap<NodeId, AbortHandle>,
    /// Removed nodes. Ids are never reused, so a run built before a removal
    /// still skips the node.
    removed: HashSet<NodeId>,
}

impl Pushes {
    fn prune(&mut self) {
        self.in_flight.retain(|_, handle| !handle.is_finished());
    }
}

impl Propagator {
    pub fn new(
        provider: Arc<dyn NodeProvider>,
        retry_delay: Duration,
        mode: PropagationMode,
        events: broadcast::Sender<MeshEvent>,
    ) -> Self {
        Self {
            provider,
            retry_delay,
            mode,
            events,
            pushes: Mutex::new(Pushes::default()),
        }
    }

    fn pushes(&self) -> MutexGuard<'_, Pushes> {
        self.pushes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push `state` to every participating node.
    ///
    /// Client shaping is applied once, before any node push, and not retried.
    pub async fn propagate(&self, state: &MeshState) {
        if !state.is_routable() {
            debug!(nodes = state.nodes.len(), "Too few nodes to propagate");
            return;
        }

        let clients = state.client_health();
        if let Err(e) = self.provider.set_client_health(&clients).await {
            warn!(error = %e, "Failed to set client health");
        }

        let mut pushes = Vec::with_capacity(state.nodes.len());
        {
            // Spawn under the lock so a concurrent `forget` either sees the
            // handle or has already marked the node removed.
            let mut registry = self.pushes();
            registry.prune();
            for &id in state.nodes.keys() {
                if registry.removed.contains(&id) {
                    debug!(node = %id, "Skipping push to removed node");
                    continue;
                }
                let push = NodePush {
                    provider: Arc::clone(&self.provider),
                    id,
                    routes: state.routing_table(id),
                    health: state.health_payload(id),
                    retry_delay: self.retry_delay,
                    events: self.events.clone(),
                };
                let handle = tokio::spawn(push.run());
                if let Some(previous) = registry.in_flight.insert(id, handle.abort_handle()) {
                    previous.abort();
                }
                pushes.push(handle);
            }
        }

        match self.mode {
            PropagationMode::AwaitAll => {
                let results = join_all(pushes).await;
                self.pushes().prune();
                let superseded = results.iter().filter(|r| r.is_err()).count();
                info!(
                    generation = state.generation,
                    nodes = results.len() - superseded,
                    superseded,
                    "Propagation complete"
                );
            }
            PropagationMode::Detached => {
                debug!(
                    generation = state.generation,
                    nodes = pushes.len(),
                    "Propagation detached"
                );
            }
        }
    }

    /// Abort any push still retrying against `id` and skip it from now on.
    pub fn forget(&self, id: NodeId) {
        let mut registry = self.pushes();
        registry.removed.insert(id);
        if let Some(handle) = registry.in_flight.remove(&id) {
            handle.abort();
        }
    }

    pub fn abort_all(&self) {
        for (_, handle) in self.pushes().in_flight.drain() {
            handle.abort();
        }
    }

    /// Pushes that have not finished yet.
    #[cfg(test)]
    fn pending(&self) -> usize {
        let mut registry = self.pushes();
        registry.prune();
        registry.in_flight.len()
    }
}

struct NodePush {
    provider: Arc<dyn NodeProvider>,
    id: NodeId,
    routes: Vec<RouteEntry>,
    health: HealthPayload,
    retry_delay: Duration,
    events: broadcast::Sender<MeshEvent>,
}

impl NodePush {
    async fn run(self) {
        tokio::join!(self.deliver(PushKind::Routes), self.deliver(PushKind::Health));
    }

    async fn attempt(&self, kind: PushKind) -> crate::Result<String> {
        match kind {
            PushKind::Routes => self.provider.push_routes(self.id, &self.routes).await,
            PushKind::Health => self.provider.push_health(self.id, &self.health).await,
        }
    }

    /// Retry `kind` until acknowledged. Returns the number of attempts.
    async fn deliver(&self, kind: PushKind) -> u32 {
        let mut attempt = 1;
        loop {
            match self.attempt(kind).await {
                Ok(ack) => {
                    debug!(node = %self.id, %kind, attempt, ack = %ack, "Push acknowledged");
                    let _ = self.events.send(MeshEvent::PushDelivered {
                        node: self.id,
                        kind,
                        attempts: attempt,
                    });
                    return attempt;
                }
                Err(e) => {
                    warn!(node = %self.id, %kind, attempt, error = %e, "Push failed, retrying");
                    let _ = self.events.send(MeshEvent::PushRetrying {
                        node: self.id,
                        kind,
                        attempt,
                        reason: e.to_string(),
                    });
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use meshsim_topology::{LinkDefaults, OverrideStore, Position};

    use crate::memory::MemoryProvider;
    use crate::node::Node;

    async fn line(provider: &MemoryProvider, ids: &[u64]) -> MeshState {
        let mut nodes = BTreeMap::new();
        for (i, &id) in ids.iter().enumerate() {
            let id = NodeId(id);
            let address = provider.start(id, "127.0.0.1").await.unwrap();
            let node = Node {
                id,
                position: Position {
                    x: 50.0 * i as f64,
                    y: 0.0,
                },
                address: Some(address),
            };
            nodes.insert(id, node);
        }
        MeshState::build(1, nodes, Arc::new(LinkDefaults::default()), OverrideStore::new())
    }

    fn propagator(provider: &Arc<MemoryProvider>, mode: PropagationMode) -> Propagator {
        let (events, _) = broadcast::channel(64);
        Propagator::new(provider.clone(), Duration::from_millis(5), mode, events)
    }

    #[tokio::test]
    async fn finished_pushes_leave_no_handles() {
        let provider = Arc::new(MemoryProvider::new());
        let state = line(&provider, &[0, 1, 2]).await;
        let propagator = propagator(&provider, PropagationMode::AwaitAll);

        propagator.propagate(&state).await;
        assert_eq!(propagator.pending(), 0);
        propagator.propagate(&state).await;
        assert_eq!(propagator.pending(), 0);
        assert_eq!(provider.attempts(NodeId(2), PushKind::Routes), 2);
    }

    #[tokio::test]
    async fn forgotten_nodes_are_skipped_by_later_runs() {
        let provider = Arc::new(MemoryProvider::new());
        let state = line(&provider, &[0, 1, 2]).await;
        let propagator = propagator(&provider, PropagationMode::AwaitAll);

        // Node 2 is gone but the snapshot still lists it.
        propagator.forget(NodeId(2));
        provider.stop(NodeId(2)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), propagator.propagate(&state))
            .await
            .expect("propagation blocked on a removed node");
        assert_eq!(provider.attempts(NodeId(2), PushKind::Routes), 0);
        assert!(provider.routes(NodeId(0)).is_some());
    }

    #[tokio::test]
    async fn detached_pushes_are_pruned_once_done() {
        let provider = Arc::new(MemoryProvider::new());
        let state = line(&provider, &[0, 1]).await;
        let propagator = propagator(&provider, PropagationMode::Detached);

        propagator.propagate(&state).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while propagator.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pushes never finished");
    }
}
