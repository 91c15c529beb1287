//! The Gadget protocol: what one computation unit does when its inputs move.

use crate::error::GadgetError;
use crate::id::GadgetId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pin name → value. Ordered so execution records are deterministic.
pub type PinValues = BTreeMap<String, Value>;

/// What a gadget can see about itself while processing.
#[derive(Debug, Clone)]
pub struct GadgetContext {
    /// The instance being executed.
    pub gadget: GadgetId,
    /// Params from the realized node. For aspect shims this is the
    /// composed parameter value.
    pub params: Value,
}

impl GadgetContext {
    /// Create a context.
    pub fn new(gadget: GadgetId, params: Value) -> Self {
        Self { gadget, params }
    }
}

/// A computation unit with named input and output pins.
///
/// The executor snapshots every input pin, asks [`Gadget::activation`]
/// whether to fire, and only then awaits [`Gadget::process`]. Outputs are
/// fed back through propagation, never written to contacts directly, so
/// a gadget cannot move a contact down its lattice.
///
/// Returning an error from `process` is isolated to this gadget: it is
/// logged and counted, and the board keeps running.
#[async_trait]
pub trait Gadget: Send + Sync {
    /// Input pin names.
    fn inputs(&self) -> &[String];

    /// Output pin names.
    fn outputs(&self) -> &[String];

    /// Whether the current inputs are enough to fire.
    /// Default: every input pin holds a non-null value.
    fn activation(&self, inputs: &PinValues) -> bool {
        self.inputs()
            .iter()
            .all(|pin| inputs.get(pin).is_some_and(|v| !v.is_null()))
    }

    /// Compute outputs from inputs. Pins missing from the result are left alone.
    async fn process(&self, inputs: PinValues, ctx: &GadgetContext)
    -> Result<PinValues, GadgetError>;
}

type ProcessFn = dyn Fn(&PinValues, &GadgetContext) -> Result<PinValues, GadgetError> + Send + Sync;

/// A gadget built from a synchronous closure. See [`gadget_fn`].
pub struct FnGadget {
    inputs: Vec<String>,
    outputs: Vec<String>,
    process: Box<ProcessFn>,
}

#[async_trait]
impl Gadget for FnGadget {
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
        (self.process)(&inputs, ctx)
    }
}

/// Create a gadget from a closure.
///
/// # Example
///
/// ```
/// use bassline_core::gadget::{gadget_fn, PinValues};
/// use serde_json::json;
///
/// let double = gadget_fn(["x"], ["y"], |inputs, _ctx| {
///     let x = inputs["x"].as_f64().unwrap_or_default();
///     Ok(PinValues::from([("y".to_string(), json!(x * 2.0))]))
/// });
/// ```
pub fn gadget_fn<I, O, F>(inputs: I, outputs: O, f: F) -> Arc<dyn Gadget>
where
    I: IntoIterator,
    I::Item: Into<String>,
    O: IntoIterator,
    O::Item: Into<String>,
    F: Fn(&PinValues, &GadgetContext) -> Result<PinValues, GadgetError> + Send + Sync + 'static,
{
    Arc::new(FnGadget {
        inputs: inputs.into_iter().map(Into::into).collect(),
        outputs: outputs.into_iter().map(Into::into).collect(),
        process: Box::new(f),
    })
}
