#![deny(missing_docs)]
//! The bassline binder.
//!
//! A [`Binder`] owns one board's [`BoardIr`](bassline_core::BoardIr) and
//! compiles it into a [`RealizedGraph`](bassline_core::RealizedGraph):
//!
//! 1. **Normalize.** Wires without ids get one derived from their
//!    endpoints; empty occupant lists are dropped.
//! 2. **Validate.** Pinouts, slots, gadgets and pin directions are
//!    checked. Nothing is lowered from an invalid board.
//! 3. **Lower.** Each occupant becomes a gadget node; each wire becomes an
//!    edge chain through one shim node per data-plane aspect, in canonical
//!    aspect order. Control-plane aspects tag the edges instead.
//!
//! Node and edge ids are content hashes, so the same IR always lowers to
//! the same graph and a change shows up as a minimal diff.
//!
//! Later changes arrive as [`Plan`]s. Each plan is applied to a copy of
//! the IR and the whole pipeline reruns; the result is committed only if
//! it succeeds. Either way, one [`Receipt`](bassline_core::Receipt) is
//! recorded.

mod binder;
mod ids;
mod lower;
mod plan;
mod rewrite;
mod validate;

pub use binder::{Binder, BinderOptions};
pub use plan::{EndpointShape, Plan, PlanOp, WirePatch, WireSelector};
pub use rewrite::Rewriter;
