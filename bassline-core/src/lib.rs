//! # bassline-core: protocol types for gadget graphs
//!
//! This crate defines the vocabulary every other bassline crate speaks:
//! the declared state of a board, the compiled graph it lowers to, the
//! lattices that type contact values, and the gadget trait that computes
//! over them.
//!
//! ## The pieces
//!
//! | Concern | Types | What it is |
//! |---------|-------|------------|
//! | Declaration | [`BoardIr`], [`WireDecl`], [`AspectInstance`] | Desired state, plain data |
//! | Compilation | [`RealizedGraph`], [`Node`], [`Edge`], [`GraphDiff`] | Content-addressed executable form |
//! | Audit | [`Receipt`], [`Provenance`] | One immutable record per mutation |
//! | Values | [`Lattice`], [`LatticeRegistry`] | Join-semilattices over JSON |
//! | Computation | [`Gadget`], [`PinValues`] | Async computation units |
//!
//! ## Monotonicity
//!
//! Contact values only move upward in their lattice. Gadgets never write
//! contacts; their outputs are joined in through propagation. A partially
//! applied propagation is therefore always a safe subset of the final
//! answer, which is what lets the runtime truncate runaway work without
//! rolling anything back.
//!
//! ## Dependency Notes
//!
//! Values, params and policies are `serde_json::Value`. The IR has to be
//! producible by external tooling in any serde format, and lattices are
//! pluggable, so a single dynamic value type is the common ground.

#![deny(missing_docs)]

pub mod duration;
pub mod error;
pub mod gadget;
pub mod graph;
pub mod id;
pub mod ir;
pub mod lattice;
pub mod receipt;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use duration::Elapsed;
pub use error::{AspectError, BinderError, ContactError, GadgetError, LatticeError, RuntimeError};
pub use gadget::{FnGadget, Gadget, GadgetContext, PinValues, gadget_fn};
pub use graph::{Edge, GraphDiff, Node, NodeKind, NodeProvenance, PinDirection, PinSpec, RealizedGraph};
pub use id::{
    AspectId, BoardId, ConnectionId, ContactId, EdgeId, GadgetId, NodeId, ReceiptId, WireId,
};
pub use ir::{AspectInstance, BoardIr, Endpoint, Occupant, Pinout, SlotDecl, WireDecl};
pub use lattice::{
    Lattice, LatticeRegistry, MaxLattice, MinLattice, OrLattice, RecordLattice, SetUnionLattice,
};
pub use receipt::{Provenance, Receipt, ReceiptStatus};
