//! The mesh engine: node table, debounced rewiring and publication.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use meshsim_topology::{
    DefaultsPatch, LinkDefaults, LinkField, LinkKey, LinkOverride, NodeId, OverrideStore, Position,
    TopologyError,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::debounce::{Admission, Debounce, RewireState};
use crate::error::{Error, Result};
use crate::events::MeshEvent;
use crate::node::Node;
use crate::propagation::Propagator;
use crate::provider::NodeProvider;
use crate::state::{MeshState, TopologyView};

/// Result of [`MeshEngine::request_rewire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewireOutcome {
    /// This call ran `runs` passes, the extra ones absorbing queued requests.
    Completed { runs: usize },
    /// A run was in flight; it will pick up this request.
    Queued,
    /// A deferral is held; its holder will request again.
    Deferred,
    /// The run task died before finishing.
    Aborted,
}

/// Mutable engine state, guarded by one lock.
struct Control {
    next_id: u64,
    nodes: BTreeMap<NodeId, Node>,
    overrides: OverrideStore,
    defaults: Arc<LinkDefaults>,
    debounce: Debounce,
    generation: u64,
}

struct Inner {
    config: EngineConfig,
    provider: Arc<dyn NodeProvider>,
    control: Mutex<Control>,
    published: watch::Sender<Arc<MeshState>>,
    events: broadcast::Sender<MeshEvent>,
    propagator: Propagator,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MeshEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run passes until no request is queued. Returns the number of passes.
    async fn run_until_settled(&self) -> usize {
        let mut guard = RunGuard {
            inner: self,
            finished: false,
        };
        let mut runs = 0;
        loop {
            let (generation, nodes, defaults, overrides) = {
                let mut control = self.lock();
                control.generation += 1;
                (
                    control.generation,
                    control.nodes.clone(),
                    Arc::clone(&control.defaults),
                    control.overrides.clone(),
                )
            };

            let state = Arc::new(MeshState::build(generation, nodes, defaults, overrides));
            info!(
                generation,
                nodes = state.nodes.len(),
                links = state.topology.edge_count(),
                "Rewired mesh"
            );
            // Readers see the new graph before pushes land.
            self.published.send_replace(Arc::clone(&state));
            self.emit(MeshEvent::RewireCompleted {
                generation,
                nodes: state.nodes.len(),
                links: state.topology.edge_count(),
            });

            self.propagator.propagate(&state).await;
            runs += 1;

            if !self.lock().debounce.complete() {
                break;
            }
            debug!("Running queued rewire");
        }
        guard.finished = true;
        runs
    }
}

/// Resets the debouncer if a run is dropped midway.
struct RunGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Rewire run abandoned");
            self.inner.lock().debounce.abandon();
        }
    }
}

/// Suppresses rewire requests while held.
///
/// Dropping it releases the deferral without rewiring; use
/// [`release`](Self::release) to release and request a rewire in one step.
pub struct RewireDeferral {
    inner: Arc<Inner>,
}

impl RewireDeferral {
    pub async fn release(self) -> RewireOutcome {
        let engine = MeshEngine {
            inner: Arc::clone(&self.inner),
        };
        drop(self);
        engine.request_rewire().await
    }
}

impl Drop for RewireDeferral {
    fn drop(&mut self) {
        self.inner.lock().debounce.end_deferral();
    }
}

/// Owns the simulated mesh and keeps the nodes' routes in sync with it.
#[derive(Clone)]
pub struct MeshEngine {
    inner: Arc<Inner>,
}

impl MeshEngine {
    pub fn new(provider: Arc<dyn NodeProvider>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (published, _) = watch::channel(Arc::new(MeshState::default()));
        let propagator = Propagator::new(
            Arc::clone(&provider),
            config.retry_delay,
            config.propagation,
            events.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                control: Mutex::new(Control {
                    next_id: 0,
                    nodes: BTreeMap::new(),
                    overrides: OverrideStore::new(),
                    defaults: Arc::new(LinkDefaults::default()),
                    debounce: Debounce::new(),
                    generation: 0,
                }),
                published,
                events,
                propagator,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn NodeProvider> {
        &self.inner.provider
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.inner.events.subscribe()
    }

    /// Receiver that sees every published state.
    pub fn watch(&self) -> watch::Receiver<Arc<MeshState>> {
        self.inner.published.subscribe()
    }

    /// Last published state.
    pub fn state(&self) -> Arc<MeshState> {
        self.inner.published.borrow().clone()
    }

    pub fn rewire_state(&self) -> RewireState {
        self.inner.lock().debounce.state()
    }

    pub fn defer_rewire(&self) -> RewireDeferral {
        self.inner.lock().debounce.begin_deferral();
        RewireDeferral {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Request a rewire.
    ///
    /// Requests made while a run is in flight collapse into one follow-up
    /// pass. The run itself executes on its own task, so dropping this
    /// future does not interrupt it.
    pub async fn request_rewire(&self) -> RewireOutcome {
        let admission = self.inner.lock().debounce.request();
        match admission {
            Admission::Deferred => {
                debug!("Skipping rewire, deferral held");
                return RewireOutcome::Deferred;
            }
            Admission::Queued => {
                debug!("Rewire in progress, queueing");
                return RewireOutcome::Queued;
            }
            Admission::Run => {}
        }

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.run_until_settled().await }).await {
            Ok(runs) => RewireOutcome::Completed { runs },
            Err(e) => {
                error!(error = %e, "Rewire task failed");
                RewireOutcome::Aborted
            }
        }
    }

    /// Add a node at `(x, y)` and start its process.
    ///
    /// Rewiring is deferred until the node has an address. If the start
    /// fails the node is dropped again.
    pub async fn add_node(&self, x: f64, y: f64) -> Result<NodeId> {
        let position = Position::new(x, y)?;
        let deferral = self.defer_rewire();

        let id = {
            let mut control = self.inner.lock();
            let id = NodeId(control.next_id);
            control.next_id += 1;
            control.nodes.insert(id, Node::new(id, position));
            id
        };
        info!(node = %id, x, y, "Adding node");
        self.inner.emit(MeshEvent::NodeAdded { node: id, position });

        let started = self.inner.provider.start(id, &self.inner.config.host).await;
        let outcome = match started {
            Ok(address) => {
                let ip = address.ip;
                let present = {
                    let mut control = self.inner.lock();
                    match control.nodes.get_mut(&id) {
                        Some(node) => {
                            node.address = Some(address);
                            true
                        }
                        None => false,
                    }
                };
                if present {
                    info!(node = %id, %ip, "Node started");
                    self.inner.emit(MeshEvent::NodeStarted { node: id, ip });
                    Ok(id)
                } else {
                    warn!(node = %id, "Node removed while starting, stopping it");
                    if let Err(e) = self.inner.provider.stop(id).await {
                        warn!(node = %id, error = %e, "Failed to stop node");
                    }
                    Err(Error::unknown_node(id))
                }
            }
            Err(e) => {
                error!(node = %id, error = %e, "Failed to start node");
                if self.inner.lock().nodes.remove(&id).is_some() {
                    self.inner.emit(MeshEvent::NodeRemoved { node: id });
                }
                Err(e)
            }
        };

        deferral.release().await;
        outcome
    }

    pub async fn move_node(&self, id: NodeId, x: f64, y: f64) -> Result<()> {
        let position = Position::new(x, y)?;
        {
            let mut control = self.inner.lock();
            let node = control
                .nodes
                .get_mut(&id)
                .ok_or(TopologyError::UnknownNode(id))?;
            node.position = position;
        }
        debug!(node = %id, x, y, "Moved node");
        self.inner.emit(MeshEvent::NodeMoved { node: id, position });
        self.request_rewire().await;
        Ok(())
    }

    /// Remove a node, its overrides and any pushes still retrying against it.
    pub async fn remove_node(&self, id: NodeId) -> Result<()> {
        let (node, evicted) = {
            let mut control = self.inner.lock();
            let node = control
                .nodes
                .remove(&id)
                .ok_or(TopologyError::UnknownNode(id))?;
            let evicted = control.overrides.remove_node(id);
            (node, evicted)
        };
        info!(node = %id, evicted, "Removing node");
        self.inner.propagator.forget(id);

        if node.is_started() {
            if let Err(e) = self.inner.provider.stop(id).await {
                warn!(node = %id, error = %e, "Failed to stop node");
            }
        }
        self.inner.emit(MeshEvent::NodeRemoved { node: id });
        self.request_rewire().await;
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.inner.lock().nodes.get(&id).cloned()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.inner.lock().nodes.values().cloned().collect()
    }

    pub fn defaults(&self) -> Arc<LinkDefaults> {
        Arc::clone(&self.inner.lock().defaults)
    }

    /// Apply a partial defaults update. Invalid values leave defaults untouched.
    pub async fn set_defaults(&self, patch: &DefaultsPatch) -> Result<Arc<LinkDefaults>> {
        let defaults = {
            let mut control = self.inner.lock();
            let defaults = Arc::new(control.defaults.patched(patch)?);
            control.defaults = Arc::clone(&defaults);
            defaults
        };
        info!(?defaults, "Defaults updated");
        self.inner.emit(MeshEvent::DefaultsChanged);
        self.request_rewire().await;
        Ok(defaults)
    }

    pub async fn set_link_override(
        &self,
        a: NodeId,
        b: NodeId,
        patch: &LinkOverride,
    ) -> Result<()> {
        {
            let mut control = self.inner.lock();
            for id in [a, b] {
                if !control.nodes.contains_key(&id) {
                    return Err(Error::unknown_node(id));
                }
            }
            control.overrides.apply(a, b, patch)?;
        }
        debug!(%a, %b, ?patch, "Link override set");
        self.inner.emit(MeshEvent::link_overridden(LinkKey::new(a, b)));
        self.request_rewire().await;
        Ok(())
    }

    pub async fn clear_link_override(&self, a: NodeId, b: NodeId, field: LinkField) -> Result<()> {
        let cleared = {
            let mut control = self.inner.lock();
            for id in [a, b] {
                if !control.nodes.contains_key(&id) {
                    return Err(Error::unknown_node(id));
                }
            }
            if a == b {
                return Err(TopologyError::SelfLink(a).into());
            }
            control.overrides.clear(a, b, field)
        };
        debug!(%a, %b, %field, cleared, "Link override cleared");
        self.inner.emit(MeshEvent::link_overridden(LinkKey::new(a, b)));
        self.request_rewire().await;
        Ok(())
    }

    /// Live nodes with the links of the last published run.
    pub fn topology_view(&self) -> TopologyView {
        let nodes = self.nodes();
        TopologyView::new(&nodes, &self.state())
    }

    /// All-pairs path costs, or `None` before the first run.
    pub fn costs(&self) -> Option<BTreeMap<NodeId, BTreeMap<NodeId, f64>>> {
        let state = self.state();
        state.is_wired().then(|| state.paths.all_costs())
    }

    /// Shortest path from `a` to `b`, both ends included.
    ///
    /// `Ok(None)` means both nodes exist but are not connected.
    pub fn path(&self, a: NodeId, b: NodeId) -> Result<Option<Vec<NodeId>>> {
        self.require_nodes(&[a, b])?;
        Ok(self.state().paths.path(a, b))
    }

    /// Cost from `id` to every other participating node, keyed by hostname.
    pub fn destination_costs(&self, id: NodeId) -> Result<BTreeMap<String, Option<f64>>> {
        self.require_nodes(&[id])?;
        let state = self.state();
        Ok(state
            .nodes
            .keys()
            .filter(|dst| **dst != id)
            .map(|dst| (self.inner.provider.hostname(*dst), state.paths.cost(id, *dst)))
            .collect())
    }

    pub async fn bootstrap(&self) -> Result<()> {
        let started: Vec<NodeId> = self
            .nodes()
            .into_iter()
            .filter(Node::is_started)
            .map(|node| node.id)
            .collect();
        info!(nodes = started.len(), "Bootstrapping mesh");
        self.inner.provider.bootstrap(&started).await
    }

    pub async fn send_message(&self, id: NodeId, message: &str) -> Result<()> {
        let node = self.node(id).ok_or(TopologyError::UnknownNode(id))?;
        if !node.is_started() {
            return Err(Error::unavailable(id, "not started"));
        }
        debug!(node = %id, len = message.len(), "Sending message");
        self.inner.provider.send_message(id, message).await
    }

    /// Abort every push still in flight.
    pub fn shutdown(&self) {
        info!("Stopping propagation");
        self.inner.propagator.abort_all();
    }

    fn require_nodes(&self, ids: &[NodeId]) -> Result<()> {
        let control = self.inner.lock();
        match ids.iter().find(|id| !control.nodes.contains_key(id)) {
            Some(id) => Err(Error::unknown_node(*id)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    fn engine() -> (MeshEngine, Arc<MemoryProvider>) {
        let provider = Arc::new(MemoryProvider::new());
        let engine = MeshEngine::new(provider.clone(), EngineConfig::fast());
        (engine, provider)
    }

    #[tokio::test]
    async fn fresh_engine_has_no_costs() {
        let (engine, _) = engine();
        assert_eq!(engine.costs(), None);
        assert_eq!(engine.rewire_state(), RewireState::Idle);
        assert!(!engine.state().is_wired());
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let (engine, _) = engine();
        let a = engine.add_node(0.0, 0.0).await.unwrap();
        engine.remove_node(a).await.unwrap();
        let b = engine.add_node(0.0, 0.0).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn invalid_position_changes_nothing() {
        let (engine, _) = engine();
        let err = engine.add_node(f64::NAN, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTopologyRequest(_)));
        assert!(engine.nodes().is_empty());
    }

    #[tokio::test]
    async fn failed_start_drops_the_node_and_releases_deferral() {
        let (engine, provider) = engine();
        provider.fail_next_start();
        let err = engine.add_node(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::NodeUnavailable { .. }));
        assert!(engine.nodes().is_empty());

        // The deferral is gone, so requests run again.
        assert_eq!(
            engine.request_rewire().await,
            RewireOutcome::Completed { runs: 1 }
        );
    }

    #[tokio::test]
    async fn held_deferral_skips_requests() {
        let (engine, _) = engine();
        let deferral = engine.defer_rewire();
        assert_eq!(engine.request_rewire().await, RewireOutcome::Deferred);
        assert_eq!(
            deferral.release().await,
            RewireOutcome::Completed { runs: 1 }
        );
    }

    #[tokio::test]
    async fn self_link_override_is_rejected() {
        let (engine, _) = engine();
        let a = engine.add_node(0.0, 0.0).await.unwrap();
        let err = engine
            .set_link_override(a, a, &LinkOverride::default().with(LinkField::Latency, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTopologyRequest(TopologyError::SelfLink(_))
        ));
        let err = engine
            .clear_link_override(a, a, LinkField::Latency)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTopologyRequest(TopologyError::SelfLink(_))
        ));
    }

    #[tokio::test]
    async fn message_to_unknown_node_is_rejected() {
        let (engine, provider) = engine();
        let err = engine.send_message(NodeId(5), "hi").await.unwrap_err();
        assert!(matches!(err, Error::InvalidTopologyRequest(_)));

        let a = engine.add_node(0.0, 0.0).await.unwrap();
        engine.send_message(a, "hi").await.unwrap();
        assert_eq!(provider.messages(), vec![(a, "hi".to_string())]);
    }
}
