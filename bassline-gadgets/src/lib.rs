#![deny(missing_docs)]
//! Gadget execution for bassline boards.
//!
//! - [`GadgetExecutor`] tracks which gadgets are mounted on which
//!   contacts, notices when their inputs move, and runs them. Outputs go
//!   back through the [`PropagationEngine`](bassline_propagation::PropagationEngine);
//!   a gadget never writes a contact itself.
//! - [`GadgetLibrary`] maps template names to factories. Board gadgets
//!   and aspect shims are both resolved here.
//! - [`shims`] holds the gadgets behind the built-in aspects.
//!
//! A gadget whose `process` fails is logged and counted. It does not stop
//! the round and does not touch any contact.

mod executor;
mod library;
pub mod shims;
mod stats;

pub use executor::{GadgetExecutor, GadgetMount, Quiescence};
pub use library::{GadgetFactory, GadgetLibrary};
pub use shims::{TapLog, TapRecord};
pub use stats::{ExecutionStatus, GadgetExecution, GadgetStats};
