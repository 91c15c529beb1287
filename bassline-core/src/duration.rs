//! Elapsed-time measurement with a stable serialization format.
//!
//! Propagation calls routinely finish in well under a millisecond, so
//! statistics are kept in microseconds. [`Elapsed`] serializes as a plain
//! integer, never as serde's `{"secs": N, "nanos": N}` struct.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::{Duration, Instant};

/// Elapsed wall-clock time in microseconds.
///
/// # Examples
///
/// ```
/// use bassline_core::Elapsed;
///
/// let total = Elapsed::from_micros(1500) + Elapsed::from_micros(500);
/// assert_eq!(total.as_micros(), 2000);
/// assert_eq!(serde_json::to_string(&total).unwrap(), "2000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Elapsed(u64);

impl Elapsed {
    /// No time at all.
    pub const ZERO: Self = Self(0);

    /// Create from microseconds.
    pub fn from_micros(us: u64) -> Self {
        Self(us)
    }

    /// Time elapsed since `start`.
    pub fn since(start: Instant) -> Self {
        start.elapsed().into()
    }

    /// Microseconds.
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Fractional milliseconds, for averages and display.
    pub fn as_millis_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl From<Duration> for Elapsed {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
    }
}

impl From<Elapsed> for Duration {
    fn from(e: Elapsed) -> Self {
        Duration::from_micros(e.0)
    }
}

impl Add for Elapsed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Elapsed {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.0)
    }
}
