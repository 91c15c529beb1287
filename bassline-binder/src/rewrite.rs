use crate::plan::Plan;
use bassline_core::ir::BoardIr;
use std::fmt;
use std::sync::Arc;

type Pass = dyn Fn(&BoardIr) -> Result<Vec<Plan>, String> + Send + Sync;

/// A named pass that inspects the IR after initialization and proposes
/// plans.
///
/// Rewriters run in ascending `priority`, ties broken by name. A rewriter
/// that returns an error is logged and skipped; the others still run.
#[derive(Clone)]
pub struct Rewriter {
    /// Name, used for ordering ties and in logs.
    pub name: String,
    /// Lower runs first.
    pub priority: i32,
    pass: Arc<Pass>,
}

impl Rewriter {
    /// Create a rewriter.
    pub fn new<F>(name: impl Into<String>, priority: i32, pass: F) -> Self
    where
        F: Fn(&BoardIr) -> Result<Vec<Plan>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            pass: Arc::new(pass),
        }
    }

    /// Run the pass.
    pub fn run(&self, ir: &BoardIr) -> Result<Vec<Plan>, String> {
        (self.pass)(ir)
    }
}

impl fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewriter")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
