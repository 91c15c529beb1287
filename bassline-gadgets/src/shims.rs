//! Shim gadgets backing the built-in data-plane aspects.
//!
//! Every shim has a single `in` pin and a single `out` pin and sits in
//! the middle of a wire. A shim that returns no output simply stops the
//! value at that point of the wire.

use async_trait::async_trait;
use bassline_core::error::GadgetError;
use bassline_core::gadget::{Gadget, GadgetContext, PinValues};
use bassline_core::id::GadgetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

fn shim_pins() -> (Vec<String>, Vec<String>) {
    (vec!["in".into()], vec!["out".into()])
}

fn forward(inputs: &PinValues) -> PinValues {
    let value = inputs.get("in").cloned().unwrap_or_default();
    PinValues::from([("out".to_string(), value)])
}

/// One value seen by a tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapRecord {
    /// The tap shim that saw it.
    pub gadget: GadgetId,
    /// The value.
    pub value: Value,
    /// When.
    pub at: DateTime<Utc>,
}

/// Shared sink for tap records.
#[derive(Debug, Clone, Default)]
pub struct TapLog {
    records: Arc<Mutex<Vec<TapRecord>>>,
}

impl TapLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: TapRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Snapshot of every record so far.
    pub fn records(&self) -> Vec<TapRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Values seen by one tap, oldest first.
    pub fn values_for(&self, gadget: &GadgetId) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|r| &r.gadget == gadget)
            .map(|r| r.value)
            .collect()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Pass-through that records every value into a [`TapLog`].
pub struct Tap {
    log: TapLog,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Tap {
    /// A tap writing into `log`.
    pub fn new(log: TapLog) -> Self {
        let (inputs, outputs) = shim_pins();
        Self {
            log,
            inputs,
            outputs,
        }
    }
}

#[async_trait]
impl Gadget for Tap {
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
        let value = inputs.get("in").cloned().unwrap_or_default();
        tracing::info!(gadget = %ctx.gadget, value = %value, "bassline.tap");
        self.log.push(TapRecord {
            gadget: ctx.gadget.clone(),
            value,
            at: Utc::now(),
        });
        Ok(forward(&inputs))
    }
}

/// Pass-through that forwards at most `rps` values per rolling second and
/// drops the rest.
pub struct RateLimit {
    rps: f64,
    window: Mutex<VecDeque<Instant>>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl RateLimit {
    /// A limiter allowing `rps` values per second.
    pub fn new(rps: f64) -> Self {
        let (inputs, outputs) = shim_pins();
        Self {
            rps,
            window: Mutex::new(VecDeque::new()),
            inputs,
            outputs,
        }
    }

    /// Build from `{"rps": number}`.
    pub fn from_params(params: &Value) -> Result<Self, GadgetError> {
        let rps = params
            .get("rps")
            .and_then(Value::as_f64)
            .filter(|rps| *rps >= 0.0)
            .ok_or_else(|| GadgetError::InvalidParams {
                template: "rate-limit".into(),
                message: format!("expected {{\"rps\": non-negative number}}, got {params}"),
            })?;
        Ok(Self::new(rps))
    }

    /// Configured limit.
    pub fn rps(&self) -> f64 {
        self.rps
    }

    fn admit(&self, now: Instant) -> bool {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= Duration::from_secs(1) {
                window.pop_front();
            } else {
                break;
            }
        }
        if (window.len() as f64) < self.rps {
            window.push_back(now);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Gadget for RateLimit {
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
        if self.admit(Instant::now()) {
            Ok(forward(&inputs))
        } else {
            tracing::debug!(gadget = %ctx.gadget, rps = self.rps, "bassline.rate_limit.dropped");
            Ok(PinValues::new())
        }
    }
}

/// Copies `in` to `out`.
pub struct Passthrough {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Passthrough {
    /// Create a pass-through.
    pub fn new() -> Self {
        let (inputs, outputs) = shim_pins();
        Self { inputs, outputs }
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gadget for Passthrough {
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
        Ok(forward(&inputs))
    }
}
