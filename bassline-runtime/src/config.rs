//! Runtime configuration and per-operation reports.

use bassline_core::receipt::Receipt;
use bassline_gadgets::GadgetExecution;
use bassline_propagation::{PropagationLimits, PropagationStats};
use serde::{Deserialize, Serialize};

/// Configuration shared by every board a [`GraphExecutor`](crate::GraphExecutor)
/// drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bounds for each propagation call.
    pub limits: PropagationLimits,
    /// Gadget rounds per operation before giving up on a fixed point.
    pub max_rounds: usize,
    /// Lattice for pins whose pinout names none.
    pub default_lattice: String,
    /// Principal recorded on receipts the runtime issues.
    pub principal: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            limits: PropagationLimits::default(),
            max_rounds: 64,
            default_lattice: "max".into(),
            principal: "runtime".into(),
        }
    }
}

impl RuntimeConfig {
    /// Set propagation limits.
    pub fn with_limits(mut self, limits: PropagationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the round bound.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the default pin lattice.
    pub fn with_default_lattice(mut self, lattice: impl Into<String>) -> Self {
        self.default_lattice = lattice.into();
        self
    }

    /// Set the receipt principal.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }
}

/// What one update, execution or graph change did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Propagation of the triggering value, if there was one.
    pub propagation: PropagationStats,
    /// Gadget executions that followed, in order.
    pub executions: Vec<GadgetExecution>,
    /// Gadget rounds run.
    pub rounds: usize,
    /// False if `max_rounds` was hit with gadgets still triggered.
    pub quiescent: bool,
}

impl UpdateReport {
    /// Executions that completed.
    pub fn completed(&self) -> impl Iterator<Item = &GadgetExecution> {
        self.executions.iter().filter(|e| e.is_completed())
    }
}

/// Result of a graph change: the binder's receipt, and what running the
/// board to a fixed point afterwards did.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The receipt. An error receipt means nothing changed.
    pub receipt: Receipt,
    /// Propagation from new connections and the gadget rounds that
    /// followed. Empty for a rejected plan.
    pub report: UpdateReport,
}
