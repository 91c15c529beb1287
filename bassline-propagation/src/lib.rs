#![deny(missing_docs)]
//! Propagation engine for bassline boards.
//!
//! A call to [`PropagationEngine::propagate`] joins a value into one
//! contact and then walks its downstream connections breadth-first,
//! joining as it goes, until no contact changes. Because every join is
//! monotone the walk can be cut short at any point without leaving
//! anything inconsistent, and two bounds do exactly that:
//!
//! - `max_depth` stops runaway chains: the first task deeper than the
//!   bound abandons the remaining queue and marks the call `truncated`.
//! - `cycle_threshold` stops runaway loops: a contact visited more often
//!   than the bound within one call is marked cyclic and its further
//!   tasks are dropped.
//!
//! Neither bound is an error. Both are reported in [`PropagationStats`]
//! and logged at `warn`.

mod engine;
mod limits;

pub use engine::PropagationEngine;
pub use limits::{PropagationLimits, PropagationStats, PropagationTotals};
