//! Recording: a pass-through gadget that remembers what it saw.

use crate::error::GadgetError;
use crate::gadget::{Gadget, GadgetContext, PinValues};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Inputs the gadget was called with.
    pub inputs: PinValues,
    /// Params from the context.
    pub params: serde_json::Value,
}

/// Copies `in` to `out` and records every call. Use `.calls()` to inspect.
pub struct Recording {
    inputs: Vec<String>,
    outputs: Vec<String>,
    calls: Mutex<Vec<Recorded>>,
}

impl Recording {
    /// A recorder with pins `in` and `out`.
    pub fn new() -> Self {
        Self {
            inputs: vec!["in".into()],
            outputs: vec!["out".into()],
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gadget for Recording {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    async fn process(
        &self,
        inputs: PinValues,
        ctx: &GadgetContext,
    ) -> Result<PinValues, GadgetError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(Recorded {
            inputs: inputs.clone(),
            params: ctx.params.clone(),
        });
        let value = inputs.get("in").cloned().unwrap_or_default();
        Ok(PinValues::from([("out".to_string(), value)]))
    }
}
