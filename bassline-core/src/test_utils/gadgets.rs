//! Small arithmetic and failure gadgets.

use crate::error::GadgetError;
use crate::gadget::{Gadget, GadgetContext, PinValues};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

fn number(inputs: &PinValues, pin: &str) -> Result<f64, GadgetError> {
    inputs
        .get(pin)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| GadgetError::Failed(format!("pin {pin} is not a number")))
}

/// `sum = a + b`.
pub struct Adder {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Adder {
    /// An adder with pins `a`, `b` → `sum`.
    pub fn new() -> Self {
        Self {
            inputs: vec!["a".into(), "b".into()],
            outputs: vec!["sum".into()],
        }
    }
}

impl Default for Adder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gadget for Adder {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    async fn process(
        &self,
        inputs: PinValues,
        _ctx: &GadgetContext,
    ) -> Result<PinValues, GadgetError> {
        let sum = number(&inputs, "a")? + number(&inputs, "b")?;
        let sum = if sum.fract() == 0.0 { json!(sum as i64) } else { json!(sum) };
        Ok(PinValues::from([("sum".to_string(), sum)]))
    }
}

/// `out = min(in + 1, limit)`. Wired in a loop it counts up to `limit`
/// and stops, because the max lattice stops changing.
pub struct Increment {
    limit: i64,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Increment {
    /// An incrementer saturating at `limit`.
    pub fn new(limit: i64) -> Self {
        Self {
            limit,
            inputs: vec!["in".into()],
            outputs: vec!["out".into()],
        }
    }
}

#[async_trait]
impl Gadget for Increment {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    async fn process(
        &self,
        inputs: PinValues,
        _ctx: &GadgetContext,
    ) -> Result<PinValues, GadgetError> {
        let current = number(&inputs, "in")? as i64;
        let next = (current + 1).min(self.limit);
        Ok(PinValues::from([("out".to_string(), json!(next))]))
    }
}

/// Always fails.
pub struct Failing {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Failing {
    /// A failing gadget with pins `in` → `out`.
    pub fn new() -> Self {
        Self {
            inputs: vec!["in".into()],
            outputs: vec!["out".into()],
        }
    }
}

impl Default for Failing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gadget for Failing {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    async fn process(
        &self,
        _inputs: PinValues,
        _ctx: &GadgetContext,
    ) -> Result<PinValues, GadgetError> {
        Err(GadgetError::Failed("always fails".into()))
    }
}

/// Copies `in` to `out` after sleeping.
pub struct Slow {
    delay: Duration,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Slow {
    /// A pass-through that waits `delay` before answering.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inputs: vec!["in".into()],
            outputs: vec!["out".into()],
        }
    }
}

#[async_trait]
impl Gadget for Slow {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    async fn process(
        &self,
        inputs: PinValues,
        _ctx: &GadgetContext,
    ) -> Result<PinValues, GadgetError> {
        tokio::time::sleep(self.delay).await;
        let value = inputs.get("in").cloned().unwrap_or_default();
        Ok(PinValues::from([("out".to_string(), value)]))
    }
}
