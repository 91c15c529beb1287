use bassline_core::Elapsed;
use serde::{Deserialize, Serialize};

/// Safety bounds for one propagation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationLimits {
    /// Tasks deeper than this abort the rest of the queue.
    pub max_depth: usize,
    /// Visits to a single contact within one call before it is treated as
    /// cyclic.
    pub cycle_threshold: usize,
}

impl PropagationLimits {
    /// Set `max_depth`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set `cycle_threshold`.
    pub fn with_cycle_threshold(mut self, cycle_threshold: usize) -> Self {
        self.cycle_threshold = cycle_threshold;
        self
    }
}

impl Default for PropagationLimits {
    fn default() -> Self {
        Self {
            max_depth: 100,
            cycle_threshold: 10,
        }
    }
}

/// What one propagation call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationStats {
    /// Tasks dequeued and joined.
    pub tasks_processed: usize,
    /// Joins that changed a contact, the source included.
    pub values_changed: usize,
    /// Contacts that hit the cycle threshold.
    pub cycles_detected: usize,
    /// Deepest task processed.
    pub propagation_depth: usize,
    /// Tasks whose join failed.
    pub rejected: usize,
    /// Whether `max_depth` cut the call short.
    pub truncated: bool,
    /// Wall-clock time spent.
    pub duration: Elapsed,
}

impl PropagationStats {
    /// Fold another call's stats into this one.
    pub fn absorb(&mut self, other: &PropagationStats) {
        self.tasks_processed += other.tasks_processed;
        self.values_changed += other.values_changed;
        self.cycles_detected += other.cycles_detected;
        self.propagation_depth = self.propagation_depth.max(other.propagation_depth);
        self.rejected += other.rejected;
        self.truncated |= other.truncated;
        self.duration += other.duration;
    }
}

/// Running totals over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationTotals {
    /// Successful `propagate` calls.
    pub calls: u64,
    /// Sum of `tasks_processed`.
    pub tasks_processed: u64,
    /// Sum of `values_changed`.
    pub values_changed: u64,
    /// Sum of `cycles_detected`.
    pub cycles_detected: u64,
    /// Sum of `rejected`.
    pub rejected: u64,
    /// Calls that were truncated.
    pub truncations: u64,
    /// Deepest task ever processed.
    pub max_depth_seen: usize,
    /// Sum of `duration`.
    pub duration: Elapsed,
}

impl PropagationTotals {
    pub(crate) fn record(&mut self, stats: &PropagationStats) {
        self.calls += 1;
        self.tasks_processed += stats.tasks_processed as u64;
        self.values_changed += stats.values_changed as u64;
        self.cycles_detected += stats.cycles_detected as u64;
        self.rejected += stats.rejected as u64;
        self.truncations += u64::from(stats.truncated);
        self.max_depth_seen = self.max_depth_seen.max(stats.propagation_depth);
        self.duration += stats.duration;
    }
}
