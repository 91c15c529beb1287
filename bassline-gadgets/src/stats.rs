use bassline_core::Elapsed;
use bassline_core::gadget::PinValues;
use bassline_core::id::GadgetId;
use bassline_propagation::PropagationStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// `process` ran and its outputs were propagated.
    Completed,
    /// `activation` declined.
    Skipped,
    /// `process` returned an error. Nothing was propagated.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Record of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GadgetExecution {
    /// The gadget.
    pub gadget: GadgetId,
    /// Outcome.
    #[serde(flatten)]
    pub status: ExecutionStatus,
    /// Input snapshot the gadget saw.
    pub inputs: PinValues,
    /// Outputs it returned. Empty unless completed.
    pub outputs: PinValues,
    /// Aggregate of the propagations its outputs caused.
    pub propagation: PropagationStats,
    /// Time from snapshot to last propagation.
    pub duration: Elapsed,
    /// When the execution started.
    pub at: DateTime<Utc>,
}

impl GadgetExecution {
    /// Whether `process` ran and succeeded.
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Per-gadget counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetStats {
    /// Times `process` was invoked, failures included.
    pub executions: u64,
    /// Times activation declined.
    pub skipped: u64,
    /// Times `process` failed.
    pub failures: u64,
    /// Mean duration of invoked executions.
    pub average_duration_ms: f64,
    /// The latest attempt.
    pub last: Option<GadgetExecution>,
}

impl GadgetStats {
    pub(crate) fn record(&mut self, execution: GadgetExecution) {
        match execution.status {
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Completed | ExecutionStatus::Failed { .. } => {
                if matches!(execution.status, ExecutionStatus::Failed { .. }) {
                    self.failures += 1;
                }
                self.executions += 1;
                let n = self.executions as f64;
                self.average_duration_ms +=
                    (execution.duration.as_millis_f64() - self.average_duration_ms) / n;
            }
        }
        self.last = Some(execution);
    }
}
