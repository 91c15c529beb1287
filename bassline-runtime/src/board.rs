//! One running board: binder, contacts, gadgets, and the glue between the
//! realized graph and them.

use crate::config::{PlanOutcome, UpdateReport};
use bassline_aspects::AspectRegistry;
use bassline_binder::{Binder, BinderOptions, Plan};
use bassline_contacts::{ContactChange, ContactStore, Subscription};
use bassline_core::error::{ContactError, GadgetError, LatticeError, RuntimeError};
use bassline_core::gadget::Gadget;
use bassline_core::graph::{GraphDiff, NodeKind, PinDirection, RealizedGraph};
use bassline_core::id::{BoardId, ConnectionId, ContactId, EdgeId, GadgetId, NodeId};
use bassline_core::ir::BoardIr;
use bassline_core::lattice::{Lattice, LatticeRegistry};
use bassline_core::receipt::Receipt;
use bassline_gadgets::{GadgetExecutor, GadgetLibrary, GadgetMount, GadgetStats};
use bassline_propagation::{PropagationEngine, PropagationLimits, PropagationStats, PropagationTotals};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a graph change needs, resolved before any of it is
/// installed.
#[derive(Default)]
struct Prepared {
    gadgets: BTreeMap<NodeId, Arc<dyn Gadget>>,
    lattices: BTreeMap<ContactId, Arc<dyn Lattice>>,
}

/// What is installed on a board right now.
struct Installed<'a> {
    store: &'a ContactStore,
    executor: &'a GadgetExecutor,
    gadgets: &'a BTreeMap<NodeId, GadgetId>,
}

/// Instantiate every added node's gadget and look up every added pin's
/// lattice. Fails on the first unknown template or lattice.
///
/// With `installed`, also fails if the change would clash with what is
/// already there: a taken registration or contact id, or an edge whose
/// endpoint will not exist. Once this passes, installing the diff cannot
/// fail.
fn prepare(
    graph: &RealizedGraph,
    diffs: &[GraphDiff],
    env: &Environment<'_>,
    installed: Option<&Installed<'_>>,
) -> Result<Prepared, RuntimeError> {
    let mut retired_gadgets: BTreeSet<&GadgetId> = BTreeSet::new();
    let mut retired_contacts: BTreeSet<&ContactId> = BTreeSet::new();
    if let Some(installed) = installed {
        for diff in diffs {
            if let GraphDiff::RemoveNode(id) = diff
                && let Some(gadget) = installed.gadgets.get(id)
            {
                retired_gadgets.insert(gadget);
                if let Some(mount) = installed.executor.mount(gadget) {
                    retired_contacts.extend(mount.inputs.values().chain(mount.outputs.values()));
                }
            }
        }
    }
    let live = |contact: &ContactId| {
        installed.is_some_and(|i| i.store.contains(contact)) && !retired_contacts.contains(contact)
    };

    let mut prepared = Prepared::default();
    let mut registrations: BTreeSet<GadgetId> = BTreeSet::new();
    for diff in diffs {
        let GraphDiff::AddNode(id) = diff else {
            continue;
        };
        let Some(node) = graph.nodes.get(id) else {
            continue;
        };
        let gadget = env.library.create(&node.template, &node.params)?;
        if let Some(pin) = gadget.inputs().iter().find(|p| {
            node.pins
                .get(p.as_str())
                .is_none_or(|spec| spec.direction != PinDirection::Input)
        }) {
            return Err(GadgetError::InvalidParams {
                template: node.template.clone(),
                message: format!("reads pin {pin}, which node {id} does not declare as an input"),
            }
            .into());
        }

        let registration = registration_id(graph, id);
        let taken = installed.is_some_and(|i| i.executor.contains(&registration))
            && !retired_gadgets.contains(&registration);
        if taken || !registrations.insert(registration.clone()) {
            return Err(GadgetError::Duplicate(registration.to_string()).into());
        }

        for (pin, spec) in &node.pins {
            let contact = ContactId::for_pin(id, pin);
            if live(&contact) || prepared.lattices.contains_key(&contact) {
                return Err(ContactError::Duplicate(contact.to_string()).into());
            }
            let name = spec.lattice.as_deref().unwrap_or(env.default_lattice);
            prepared.lattices.insert(contact, env.lattices.get(name)?);
        }
        prepared.gadgets.insert(id.clone(), gadget);
    }

    if installed.is_some() {
        for diff in diffs {
            let GraphDiff::AddEdge(id) = diff else {
                continue;
            };
            let Some(edge) = graph.edges.get(id) else {
                continue;
            };
            for contact in [
                ContactId::for_pin(&edge.from, &edge.from_pin),
                ContactId::for_pin(&edge.to, &edge.to_pin),
            ] {
                if !live(&contact) && !prepared.lattices.contains_key(&contact) {
                    return Err(ContactError::NotFound(contact.to_string()).into());
                }
            }
        }
    }
    Ok(prepared)
}

/// The executor registration for a node: its gadget id for gadget nodes,
/// its node id for shims.
fn registration_id(graph: &RealizedGraph, id: &NodeId) -> GadgetId {
    graph
        .nodes
        .get(id)
        .filter(|n| n.kind == NodeKind::Gadget)
        .and_then(|n| n.gadget.clone())
        .unwrap_or_else(|| GadgetId::new(id.as_str()))
}

/// Mutable per-board state. Guarded by the board's operation lock.
struct BoardState {
    binder: Binder,
    executor: GadgetExecutor,
    // Realized node → executor registration.
    gadgets: BTreeMap<NodeId, GadgetId>,
    // Realized edge → contact-store connection.
    connections: BTreeMap<EdgeId, ConnectionId>,
}

impl BoardState {
    /// Apply a prepared graph diff to the contact store and executor.
    /// Returns the stats of pushing existing upstream values over new
    /// connections.
    ///
    /// A step that still fails is logged and skipped; the rest of the
    /// diff is installed regardless.
    fn install(
        &mut self,
        engine: &mut PropagationEngine,
        graph: &RealizedGraph,
        diffs: &[GraphDiff],
        mut prepared: Prepared,
    ) -> PropagationStats {
        let mut sources: BTreeSet<ContactId> = BTreeSet::new();

        for diff in diffs {
            let step = match diff {
                GraphDiff::RemoveEdge(id) => self.remove_edge(engine, id),
                GraphDiff::RemoveNode(id) => self.remove_node(engine, id),
                GraphDiff::AddNode(id) => self.add_node(engine, graph, id, &mut prepared),
                GraphDiff::AddEdge(id) => self.add_edge(engine, graph, id, &mut sources),
            };
            if let Err(e) = step {
                tracing::warn!(diff = ?diff, error = %e, "bassline.runtime.install_step_failed");
            }
        }

        // New connections carry whatever the source already holds.
        let mut flushed = PropagationStats::default();
        for source in &sources {
            match engine.propagate(source, Value::Null) {
                Ok(stats) => flushed.absorb(&stats),
                Err(e) => tracing::warn!(contact = %source, error = %e, "bassline.runtime.flush_failed"),
            }
        }
        flushed
    }

    fn remove_edge(&mut self, engine: &mut PropagationEngine, id: &EdgeId) -> Result<(), RuntimeError> {
        if let Some(connection) = self.connections.remove(id)
            && let Err(e) = engine.store_mut().disconnect(&connection)
        {
            // Removing a contact drops its connections first.
            tracing::debug!(edge = %id, error = %e, "bassline.runtime.disconnect_skipped");
        }
        Ok(())
    }

    fn remove_node(&mut self, engine: &mut PropagationEngine, id: &NodeId) -> Result<(), RuntimeError> {
        let Some(gadget) = self.gadgets.remove(id) else {
            return Ok(());
        };
        let mount = self.executor.unregister_gadget(&gadget)?;
        for contact in mount.inputs.values().chain(mount.outputs.values()) {
            engine.store_mut().remove_contact(contact)?;
        }
        tracing::debug!(node = %id, gadget = %gadget, "bassline.runtime.node_removed");
        Ok(())
    }

    fn add_node(
        &mut self,
        engine: &mut PropagationEngine,
        graph: &RealizedGraph,
        id: &NodeId,
        prepared: &mut Prepared,
    ) -> Result<(), RuntimeError> {
        let Some(node) = graph.nodes.get(id) else {
            return Ok(());
        };
        let gadget = prepared
            .gadgets
            .remove(id)
            .ok_or_else(|| GadgetError::UnknownTemplate(node.template.clone()))?;
        let mut mount = GadgetMount::new(node.params.clone());
        for (pin, spec) in &node.pins {
            let contact = ContactId::for_pin(id, pin);
            let lattice = prepared.lattices.remove(&contact).ok_or_else(|| {
                LatticeError::Unknown(spec.lattice.clone().unwrap_or_default())
            })?;
            engine
                .store_mut()
                .register_contact(contact.clone(), lattice, None)?;
            mount = match spec.direction {
                PinDirection::Input => mount.input(pin.clone(), contact),
                PinDirection::Output => mount.output(pin.clone(), contact),
            };
        }
        let registration = registration_id(graph, id);
        self.executor
            .register_gadget(registration.clone(), gadget, mount)?;
        self.gadgets.insert(id.clone(), registration);
        tracing::debug!(node = %id, template = %node.template, "bassline.runtime.node_added");
        Ok(())
    }

    fn add_edge(
        &mut self,
        engine: &mut PropagationEngine,
        graph: &RealizedGraph,
        id: &EdgeId,
        sources: &mut BTreeSet<ContactId>,
    ) -> Result<(), RuntimeError> {
        let Some(edge) = graph.edges.get(id) else {
            return Ok(());
        };
        let from = ContactId::for_pin(&edge.from, &edge.from_pin);
        let to = ContactId::for_pin(&edge.to, &edge.to_pin);
        let connection = engine
            .store_mut()
            .add_connection(edge.wire.clone(), from.clone(), to)?;
        self.connections.insert(id.clone(), connection);
        sources.insert(from);
        Ok(())
    }
}

/// A running board.
///
/// Read accessors take the board's operation lock, so they observe the
/// board between operations, never halfway through one.
pub struct BoardContext {
    id: BoardId,
    engine: Arc<Mutex<PropagationEngine>>,
    state: Mutex<BoardState>,
    max_rounds: usize,
}

/// What a board needs from its [`GraphExecutor`](crate::GraphExecutor).
pub(crate) struct Environment<'a> {
    pub(crate) library: &'a GadgetLibrary,
    pub(crate) lattices: &'a LatticeRegistry,
    pub(crate) default_lattice: &'a str,
}

impl BoardContext {
    pub(crate) async fn initialize(
        ir: BoardIr,
        aspects: Arc<AspectRegistry>,
        options: BinderOptions,
        limits: PropagationLimits,
        max_rounds: usize,
        env: &Environment<'_>,
    ) -> Result<(Self, UpdateReport), RuntimeError> {
        let id = ir.id.clone();
        let mut engine = PropagationEngine::new(ContactStore::new()).with_limits(limits);
        let mut executor = GadgetExecutor::new();
        let mut binder = Binder::new(aspects, options);
        // Rewriter plans only need their templates and lattices to resolve;
        // nothing is installed until the final graph is known.
        let (graph, _) = binder.initialize_checked(ir, |graph, diffs| {
            prepare(graph, diffs, env, None)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })?;
        let diffs = RealizedGraph::diff(&RealizedGraph::new(), &graph);
        let none = BTreeMap::new();
        let installed = Installed {
            store: engine.store(),
            executor: &executor,
            gadgets: &none,
        };
        let prepared = prepare(&graph, &diffs, env, Some(&installed))?;

        executor.subscribe(engine.store_mut());
        let mut state = BoardState {
            binder,
            executor,
            gadgets: BTreeMap::new(),
            connections: BTreeMap::new(),
        };
        let flushed = state.install(&mut engine, &graph, &diffs, prepared);
        tracing::info!(
            board = %id,
            gadgets = state.gadgets.len(),
            connections = state.connections.len(),
            contacts = engine.store().len(),
            "bassline.runtime.board_initialized"
        );

        let board = Self {
            id,
            engine: Arc::new(Mutex::new(engine)),
            state: Mutex::new(state),
            max_rounds,
        };
        let report = {
            let state = board.state.lock().await;
            board.settle(&state, flushed).await
        };
        Ok((board, report))
    }

    async fn settle(&self, state: &BoardState, propagation: PropagationStats) -> UpdateReport {
        let quiescence = state
            .executor
            .run_until_quiescent(&self.engine, self.max_rounds)
            .await;
        UpdateReport {
            propagation,
            executions: quiescence.executions,
            rounds: quiescence.rounds,
            quiescent: quiescence.quiescent,
        }
    }

    pub(crate) async fn update_contact(
        &self,
        contact: &ContactId,
        value: Value,
    ) -> Result<UpdateReport, RuntimeError> {
        let state = self.state.lock().await;
        let propagation = self.engine.lock().await.propagate(contact, value)?;
        Ok(self.settle(&state, propagation).await)
    }

    pub(crate) async fn execute_gadget(&self, gadget: &GadgetId) -> Result<UpdateReport, RuntimeError> {
        let state = self.state.lock().await;
        if !state.executor.contains(gadget) {
            return Err(RuntimeError::GadgetNotFound(gadget.to_string()));
        }
        let execution = state.executor.execute_gadget(gadget, &self.engine).await?;
        let mut report = self.settle(&state, PropagationStats::default()).await;
        report.executions.insert(0, execution);
        Ok(report)
    }

    pub(crate) async fn apply_plan(
        &self,
        plan: Plan,
        env: &Environment<'_>,
    ) -> Result<PlanOutcome, RuntimeError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut engine = self.engine.lock().await;
        let mut prepared = None;
        let installed = Installed {
            store: engine.store(),
            executor: &state.executor,
            gadgets: &state.gadgets,
        };
        let receipt = state.binder.apply_plan_checked(plan, |graph, diffs| {
            let resolved = prepare(graph, diffs, env, Some(&installed)).map_err(|e| e.to_string())?;
            prepared = Some(resolved);
            Ok(())
        });
        if !receipt.is_ok() {
            return Ok(PlanOutcome {
                receipt,
                report: UpdateReport {
                    quiescent: true,
                    ..UpdateReport::default()
                },
            });
        }

        let graph = state.binder.graph().clone();
        let flushed = state.install(&mut engine, &graph, &receipt.diffs, prepared.unwrap_or_default());
        drop(engine);
        let report = self.settle(state, flushed).await;
        Ok(PlanOutcome { receipt, report })
    }

    /// Whether `gadget` is declared on this board.
    pub(crate) async fn has_gadget(&self, gadget: &GadgetId) -> bool {
        let state = self.state.lock().await;
        state
            .binder
            .ir()
            .is_some_and(|ir| ir.occupant(gadget).is_some())
    }

    /// Tear everything down: every gadget unregistered, every contact and
    /// connection removed.
    pub(crate) async fn shutdown(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        let graph = state.binder.graph().clone();
        let diffs = RealizedGraph::diff(&graph, &RealizedGraph::new());
        let mut engine = self.engine.lock().await;
        state.install(&mut engine, &graph, &diffs, Prepared::default());
        state.executor.unsubscribe(engine.store_mut());
        tracing::info!(board = %self.id, "bassline.runtime.board_cleaned");
        Ok(())
    }

    /// Board id.
    pub fn id(&self) -> &BoardId {
        &self.id
    }

    /// The current realized graph.
    pub async fn graph(&self) -> RealizedGraph {
        self.state.lock().await.binder.graph().clone()
    }

    /// The current IR.
    pub async fn ir(&self) -> BoardIr {
        let state = self.state.lock().await;
        state
            .binder
            .ir()
            .cloned()
            .unwrap_or_else(|| BoardIr::new(self.id.clone()))
    }

    /// Every receipt, oldest first.
    pub async fn receipts(&self) -> Vec<Receipt> {
        self.state.lock().await.binder.receipts().to_vec()
    }

    /// Current value of a contact.
    pub async fn value(&self, contact: &ContactId) -> Result<Value, RuntimeError> {
        let engine = self.engine.lock().await;
        Ok(engine.store().get_value(contact)?.clone())
    }

    /// The contact holding `pin` of a mounted gadget.
    pub async fn contact_for(&self, gadget: &GadgetId, pin: &str) -> Option<ContactId> {
        let state = self.state.lock().await;
        let node = state.binder.graph().gadget_node(gadget)?;
        node.pins
            .contains_key(pin)
            .then(|| ContactId::for_pin(&node.id, pin))
    }

    /// Current value of `pin` on a mounted gadget.
    pub async fn pin_value(&self, gadget: &GadgetId, pin: &str) -> Result<Value, RuntimeError> {
        let contact = self
            .contact_for(gadget, pin)
            .await
            .ok_or_else(|| RuntimeError::GadgetNotFound(format!("{gadget}.{pin}")))?;
        self.value(&contact).await
    }

    /// Ids of every live contact, sorted.
    pub async fn contact_ids(&self) -> Vec<ContactId> {
        let engine = self.engine.lock().await;
        let mut ids: Vec<ContactId> = engine.store().contacts().map(|c| c.id.clone()).collect();
        ids.sort();
        ids
    }

    /// Execution counters for a gadget.
    pub async fn gadget_stats(&self, gadget: &GadgetId) -> Option<GadgetStats> {
        self.state.lock().await.executor.stats(gadget).await
    }

    /// Lifetime propagation counters.
    pub async fn propagation_totals(&self) -> PropagationTotals {
        self.engine.lock().await.totals().clone()
    }

    /// Listen to every contact change on this board.
    pub async fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ContactChange) + Send + Sync + 'static,
    {
        self.engine.lock().await.store_mut().on_change(listener)
    }
}

impl std::fmt::Debug for BoardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardContext")
            .field("id", &self.id)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}
