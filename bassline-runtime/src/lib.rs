#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod board;
mod config;
mod executor;

pub use board::BoardContext;
pub use config::{PlanOutcome, RuntimeConfig, UpdateReport};
pub use executor::GraphExecutor;
