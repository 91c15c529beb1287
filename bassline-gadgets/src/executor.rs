use crate::stats::{ExecutionStatus, GadgetExecution, GadgetStats};
use bassline_contacts::{ContactStore, Subscription};
use bassline_core::Elapsed;
use bassline_core::error::GadgetError;
use bassline_core::gadget::{Gadget, GadgetContext, PinValues};
use bassline_core::id::{ContactId, GadgetId};
use bassline_propagation::{PropagationEngine, PropagationStats};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;

/// Which contacts a gadget's pins are bound to, plus its params.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GadgetMount {
    /// Input pin → contact.
    pub inputs: BTreeMap<String, ContactId>,
    /// Output pin → contact.
    pub outputs: BTreeMap<String, ContactId>,
    /// Params handed to the gadget in its context.
    pub params: Value,
}

impl GadgetMount {
    /// An empty mount with `params`.
    pub fn new(params: Value) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Bind an input pin.
    pub fn input(mut self, pin: impl Into<String>, contact: impl Into<ContactId>) -> Self {
        self.inputs.insert(pin.into(), contact.into());
        self
    }

    /// Bind an output pin.
    pub fn output(mut self, pin: impl Into<String>, contact: impl Into<ContactId>) -> Self {
        self.outputs.insert(pin.into(), contact.into());
        self
    }
}

struct Registered {
    gadget: Arc<dyn Gadget>,
    mount: GadgetMount,
    // Held for a whole execution so one gadget never overlaps itself.
    running: Mutex<()>,
    stats: Mutex<GadgetStats>,
}

/// Outcome of [`GadgetExecutor::run_until_quiescent`].
#[derive(Debug, Clone, Default)]
pub struct Quiescence {
    /// Rounds executed.
    pub rounds: usize,
    /// Every execution attempt, round by round.
    pub executions: Vec<GadgetExecution>,
    /// False when the round bound was hit with gadgets still triggered.
    pub quiescent: bool,
}

/// Runs gadgets whose input contacts changed.
///
/// The executor listens to the contact store (see
/// [`subscribe`](Self::subscribe)) and remembers which contacts moved.
/// [`triggered`](Self::triggered) turns those into the set of gadgets to
/// run. Executions never hold the engine lock while a gadget is
/// processing, so distinct gadgets of one round overlap freely.
#[derive(Default)]
pub struct GadgetExecutor {
    gadgets: BTreeMap<GadgetId, Arc<Registered>>,
    // Input contact → gadgets reading it.
    readers: BTreeMap<ContactId, BTreeSet<GadgetId>>,
    dirty: Arc<std::sync::Mutex<BTreeSet<ContactId>>>,
    subscription: Option<Subscription>,
}

impl GadgetExecutor {
    /// Create an executor with no gadgets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gadget under `id`. Every input pin the gadget declares
    /// must be bound by `mount`.
    pub fn register_gadget(
        &mut self,
        id: GadgetId,
        gadget: Arc<dyn Gadget>,
        mount: GadgetMount,
    ) -> Result<(), GadgetError> {
        if self.gadgets.contains_key(&id) {
            return Err(GadgetError::Duplicate(id.to_string()));
        }
        if let Some(pin) = gadget.inputs().iter().find(|p| !mount.inputs.contains_key(*p)) {
            return Err(GadgetError::Other(
                format!("input pin {pin} of {id} is not mounted").into(),
            ));
        }
        for contact in mount.inputs.values() {
            self.readers
                .entry(contact.clone())
                .or_default()
                .insert(id.clone());
        }
        tracing::debug!(gadget = %id, "bassline.gadgets.registered");
        self.gadgets.insert(
            id,
            Arc::new(Registered {
                gadget,
                mount,
                running: Mutex::new(()),
                stats: Mutex::new(GadgetStats::default()),
            }),
        );
        Ok(())
    }

    /// Remove a gadget. Returns its mount so the caller can clean up the
    /// contacts it was bound to.
    pub fn unregister_gadget(&mut self, id: &GadgetId) -> Result<GadgetMount, GadgetError> {
        let registered = self
            .gadgets
            .remove(id)
            .ok_or_else(|| GadgetError::NotFound(id.to_string()))?;
        for contact in registered.mount.inputs.values() {
            if let Some(readers) = self.readers.get_mut(contact) {
                readers.remove(id);
                if readers.is_empty() {
                    self.readers.remove(contact);
                }
            }
        }
        tracing::debug!(gadget = %id, "bassline.gadgets.unregistered");
        Ok(registered.mount.clone())
    }

    /// Whether a gadget is registered.
    pub fn contains(&self, id: &GadgetId) -> bool {
        self.gadgets.contains_key(id)
    }

    /// Registered gadget ids, sorted.
    pub fn gadget_ids(&self) -> impl Iterator<Item = &GadgetId> {
        self.gadgets.keys()
    }

    /// The mount of a registered gadget.
    pub fn mount(&self, id: &GadgetId) -> Option<&GadgetMount> {
        self.gadgets.get(id).map(|r| &r.mount)
    }

    /// Counters for a gadget.
    pub async fn stats(&self, id: &GadgetId) -> Option<GadgetStats> {
        let registered = self.gadgets.get(id)?;
        let stats = registered.stats.lock().await;
        Some(stats.clone())
    }

    /// Start listening to `store`. Replaces an earlier subscription.
    pub fn subscribe(&mut self, store: &mut ContactStore) -> Subscription {
        if let Some(old) = self.subscription.take() {
            store.unsubscribe(old);
        }
        let dirty = self.dirty.clone();
        let sub = store.on_change(move |change| {
            dirty
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(change.contact.clone());
        });
        self.subscription = Some(sub);
        sub
    }

    /// Stop listening to `store`.
    pub fn unsubscribe(&mut self, store: &mut ContactStore) {
        if let Some(sub) = self.subscription.take() {
            store.unsubscribe(sub);
        }
    }

    /// Drain changed contacts and return the gadgets reading any of them,
    /// sorted and deduplicated.
    pub fn triggered(&self) -> Vec<GadgetId> {
        let changed = std::mem::take(
            &mut *self.dirty.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let ready: BTreeSet<&GadgetId> = changed
            .iter()
            .filter_map(|c| self.readers.get(c))
            .flatten()
            .collect();
        ready.into_iter().cloned().collect()
    }

    fn has_pending(&self) -> bool {
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| self.readers.contains_key(c))
    }

    /// Execute a gadget if its activation accepts the current inputs.
    pub async fn execute_gadget(
        &self,
        id: &GadgetId,
        engine: &Mutex<PropagationEngine>,
    ) -> Result<GadgetExecution, GadgetError> {
        self.run(id, engine, false).await
    }

    /// Execute a gadget regardless of its activation.
    pub async fn force_execute(
        &self,
        id: &GadgetId,
        engine: &Mutex<PropagationEngine>,
    ) -> Result<GadgetExecution, GadgetError> {
        self.run(id, engine, true).await
    }

    async fn run(
        &self,
        id: &GadgetId,
        engine: &Mutex<PropagationEngine>,
        force: bool,
    ) -> Result<GadgetExecution, GadgetError> {
        let registered = self
            .gadgets
            .get(id)
            .cloned()
            .ok_or_else(|| GadgetError::NotFound(id.to_string()))?;
        let _running = registered.running.lock().await;
        let at = Utc::now();
        let start = Instant::now();

        let inputs = {
            let engine = engine.lock().await;
            let mut inputs = PinValues::new();
            for pin in registered.gadget.inputs() {
                let value = match registered.mount.inputs.get(pin) {
                    Some(contact) => engine.store().get_value(contact)?.clone(),
                    None => Value::Null,
                };
                inputs.insert(pin.clone(), value);
            }
            inputs
        };

        let mut execution = GadgetExecution {
            gadget: id.clone(),
            status: ExecutionStatus::Completed,
            inputs,
            outputs: PinValues::new(),
            propagation: PropagationStats::default(),
            duration: Elapsed::ZERO,
            at,
        };

        if !force && !registered.gadget.activation(&execution.inputs) {
            tracing::debug!(gadget = %id, "bassline.gadgets.skipped");
            execution.status = ExecutionStatus::Skipped;
            execution.duration = Elapsed::since(start);
            registered.stats.lock().await.record(execution.clone());
            return Ok(execution);
        }

        let ctx = GadgetContext::new(id.clone(), registered.mount.params.clone());
        match registered
            .gadget
            .process(execution.inputs.clone(), &ctx)
            .await
        {
            Ok(outputs) => {
                let mut engine = engine.lock().await;
                for (pin, value) in &outputs {
                    let Some(contact) = registered.mount.outputs.get(pin) else {
                        tracing::debug!(gadget = %id, pin = %pin, "bassline.gadgets.unmapped_output");
                        continue;
                    };
                    match engine.propagate(contact, value.clone()) {
                        Ok(stats) => execution.propagation.absorb(&stats),
                        Err(e) => {
                            tracing::warn!(gadget = %id, pin = %pin, error = %e, "bassline.gadgets.output_rejected");
                            execution.propagation.rejected += 1;
                        }
                    }
                }
                execution.outputs = outputs;
            }
            Err(e) => {
                tracing::warn!(gadget = %id, error = %e, "bassline.gadgets.failed");
                execution.status = ExecutionStatus::Failed {
                    error: e.to_string(),
                };
            }
        }

        execution.duration = Elapsed::since(start);
        registered.stats.lock().await.record(execution.clone());
        Ok(execution)
    }

    /// Run triggered gadgets round after round until none are triggered or
    /// `max_rounds` is reached. Gadgets triggered in the same round run
    /// concurrently.
    pub async fn run_until_quiescent(
        &self,
        engine: &Mutex<PropagationEngine>,
        max_rounds: usize,
    ) -> Quiescence {
        let mut report = Quiescence::default();
        while report.rounds < max_rounds {
            let ready = self.triggered();
            if ready.is_empty() {
                report.quiescent = true;
                return report;
            }
            report.rounds += 1;
            let runs = ready.iter().map(|id| self.execute_gadget(id, engine));
            for result in futures::future::join_all(runs).await {
                match result {
                    Ok(execution) => report.executions.push(execution),
                    Err(e) => tracing::warn!(error = %e, "bassline.gadgets.execution_error"),
                }
            }
        }
        report.quiescent = !self.has_pending();
        if !report.quiescent {
            tracing::warn!(max_rounds, "bassline.gadgets.round_limit");
        }
        report
    }
}

impl std::fmt::Debug for GadgetExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GadgetExecutor")
            .field("gadgets", &self.gadgets.keys().collect::<Vec<_>>())
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}
