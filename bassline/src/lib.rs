#![deny(missing_docs)]
//! # bassline: umbrella crate
//!
//! One import surface for the bassline crates. Protocol types are always
//! available; the binder, propagation, gadget and runtime layers sit
//! behind feature flags. `runtime` (the default) enables all of them.
//! [`prelude`] has the happy path.

pub use bassline_core;
#[cfg(feature = "binder")]
pub use bassline_aspects;
#[cfg(feature = "binder")]
pub use bassline_binder;
#[cfg(feature = "propagation")]
pub use bassline_contacts;
#[cfg(feature = "gadgets")]
pub use bassline_gadgets;
#[cfg(feature = "propagation")]
pub use bassline_propagation;
#[cfg(feature = "runtime")]
pub use bassline_runtime;

/// Happy-path imports for building and running boards.
pub mod prelude {
    pub use bassline_core::{
        AspectInstance, BoardId, BoardIr, ContactId, Endpoint, Gadget, GadgetContext, GadgetId,
        Lattice, LatticeRegistry, Occupant, PinValues, Pinout, RealizedGraph, Receipt, WireDecl,
        gadget_fn,
    };

    #[cfg(feature = "binder")]
    pub use bassline_aspects::{AspectManifest, AspectRegistry};

    #[cfg(feature = "binder")]
    pub use bassline_binder::{Binder, BinderOptions, Plan, Rewriter, WireSelector};

    #[cfg(feature = "propagation")]
    pub use bassline_contacts::ContactStore;

    #[cfg(feature = "propagation")]
    pub use bassline_propagation::{PropagationEngine, PropagationLimits};

    #[cfg(feature = "gadgets")]
    pub use bassline_gadgets::{GadgetExecutor, GadgetLibrary};

    #[cfg(feature = "runtime")]
    pub use bassline_runtime::{BoardContext, GraphExecutor, RuntimeConfig};
}
