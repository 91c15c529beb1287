use crate::limits::{PropagationLimits, PropagationStats, PropagationTotals};
use bassline_contacts::ContactStore;
use bassline_core::Elapsed;
use bassline_core::error::ContactError;
use bassline_core::id::ContactId;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

#[derive(Debug)]
struct Task {
    from: ContactId,
    to: ContactId,
    value: Value,
    depth: usize,
}

/// Pushes values through a [`ContactStore`] until nothing changes.
///
/// The engine owns the store. Topology and registration go through
/// [`store_mut`](Self::store_mut); values should only move through
/// [`propagate`](Self::propagate).
#[derive(Debug, Default)]
pub struct PropagationEngine {
    store: ContactStore,
    limits: PropagationLimits,
    totals: PropagationTotals,
}

impl PropagationEngine {
    /// Create an engine around `store` with default limits.
    pub fn new(store: ContactStore) -> Self {
        Self {
            store,
            limits: PropagationLimits::default(),
            totals: PropagationTotals::default(),
        }
    }

    /// Replace the limits.
    pub fn with_limits(mut self, limits: PropagationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Change the limits for subsequent calls.
    pub fn set_limits(&mut self, max_depth: usize, cycle_threshold: usize) {
        self.limits = PropagationLimits {
            max_depth,
            cycle_threshold,
        };
    }

    /// Current limits.
    pub fn limits(&self) -> PropagationLimits {
        self.limits
    }

    /// Lifetime totals.
    pub fn totals(&self) -> &PropagationTotals {
        &self.totals
    }

    /// The contact store.
    pub fn store(&self) -> &ContactStore {
        &self.store
    }

    /// The contact store, for registration and topology changes.
    pub fn store_mut(&mut self) -> &mut ContactStore {
        &mut self.store
    }

    /// Join `value` into `source` and carry the result downstream.
    ///
    /// The source's downstream is always seeded with its current value,
    /// even if the join changed nothing, so connections added since the
    /// last change get fed. Only errors on the source itself are returned;
    /// a failing join further along is counted in `rejected` and the rest
    /// of the queue continues.
    pub fn propagate(
        &mut self,
        source: &ContactId,
        value: Value,
    ) -> Result<PropagationStats, ContactError> {
        let start = Instant::now();
        let mut stats = PropagationStats::default();

        if self.store.update_value(source, &value)? {
            stats.values_changed += 1;
        }
        let current = self.store.get_value(source)?.clone();

        let mut queue: VecDeque<Task> = VecDeque::new();
        if !current.is_null() {
            for to in self.store.get_downstream_contacts(source) {
                queue.push_back(Task {
                    from: source.clone(),
                    to,
                    value: current.clone(),
                    depth: 1,
                });
            }
        }

        let mut visits: HashMap<ContactId, usize> = HashMap::new();
        let mut cyclic: HashSet<ContactId> = HashSet::new();

        while let Some(task) = queue.pop_front() {
            if task.depth > self.limits.max_depth {
                tracing::warn!(
                    source = %source,
                    depth = task.depth,
                    max_depth = self.limits.max_depth,
                    dropped = queue.len() + 1,
                    "bassline.propagate.truncated"
                );
                stats.truncated = true;
                break;
            }
            if cyclic.contains(&task.to) {
                continue;
            }
            let seen = visits.entry(task.to.clone()).or_insert(0);
            *seen += 1;
            if *seen > self.limits.cycle_threshold {
                tracing::warn!(
                    contact = %task.to,
                    threshold = self.limits.cycle_threshold,
                    "bassline.propagate.cycle_detected"
                );
                cyclic.insert(task.to);
                stats.cycles_detected += 1;
                continue;
            }

            stats.tasks_processed += 1;
            stats.propagation_depth = stats.propagation_depth.max(task.depth);
            tracing::debug!(from = %task.from, to = %task.to, depth = task.depth, "bassline.propagate.task");

            match self.store.update_value(&task.to, &task.value) {
                Ok(true) => {
                    stats.values_changed += 1;
                    let next = self.store.get_value(&task.to)?.clone();
                    for to in self.store.get_downstream_contacts(&task.to) {
                        if to == task.from {
                            continue;
                        }
                        queue.push_back(Task {
                            from: task.to.clone(),
                            to,
                            value: next.clone(),
                            depth: task.depth + 1,
                        });
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(from = %task.from, to = %task.to, error = %e, "bassline.propagate.rejected");
                    stats.rejected += 1;
                }
            }
        }

        stats.duration = Elapsed::since(start);
        self.totals.record(&stats);
        Ok(stats)
    }

    /// Propagate several updates in order and aggregate their stats.
    ///
    /// Stops at the first update whose source fails; earlier updates stay
    /// applied.
    pub fn batch_propagate<I>(&mut self, updates: I) -> Result<PropagationStats, ContactError>
    where
        I: IntoIterator<Item = (ContactId, Value)>,
    {
        let mut total = PropagationStats::default();
        for (contact, value) in updates {
            let stats = self.propagate(&contact, value)?;
            total.absorb(&stats);
        }
        Ok(total)
    }
}
