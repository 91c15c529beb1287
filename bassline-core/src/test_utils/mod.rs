//! Reference gadgets and lattices for tests.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that exercise the protocol from the outside.

mod append_lattice;
mod gadgets;
mod recording;

pub use append_lattice::AppendLattice;
pub use gadgets::{Adder, Failing, Increment, Slow};
pub use recording::{Recorded, Recording};
