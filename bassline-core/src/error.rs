//! Error types for each protocol.

use thiserror::Error;

/// A lattice join could not be computed.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LatticeError {
    /// The value does not belong to the lattice's carrier type.
    #[error("{lattice} lattice cannot hold {found}")]
    TypeMismatch {
        /// Name of the lattice.
        lattice: String,
        /// JSON type name of the offending value.
        found: String,
    },

    /// No lattice registered under this name.
    #[error("unknown lattice: {0}")]
    Unknown(String),
}

/// Contact store errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContactError {
    /// The contact was never registered (or was removed).
    #[error("contact not found: {0}")]
    NotFound(String),

    /// A contact with this id already exists.
    #[error("contact already registered: {0}")]
    Duplicate(String),

    /// The connection was never added (or was removed).
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// Joining the incoming value failed.
    #[error("join failed on {contact}: {source}")]
    Lattice {
        /// Contact being updated.
        contact: String,
        /// Underlying lattice error.
        #[source]
        source: LatticeError,
    },
}

/// Gadget errors: lookup failures and failures raised by gadget bodies.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GadgetError {
    /// No gadget template registered under this name.
    #[error("unknown gadget template: {0}")]
    UnknownTemplate(String),

    /// No gadget registered under this id.
    #[error("gadget not found: {0}")]
    NotFound(String),

    /// A gadget with this id is already registered.
    #[error("gadget already registered: {0}")]
    Duplicate(String),

    /// The gadget body failed. Isolated to the gadget's execution record.
    #[error("gadget failed: {0}")]
    Failed(String),

    /// Construction of a gadget instance from its params failed.
    #[error("invalid gadget params for {template}: {message}")]
    InvalidParams {
        /// Template being instantiated.
        template: String,
        /// What was wrong.
        message: String,
    },

    /// Contact store failure while reading inputs.
    #[error("contact error: {0}")]
    Contact(#[from] ContactError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Aspect registry errors.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AspectError {
    /// A manifest with this id is already registered.
    #[error("aspect already registered: {0}")]
    Duplicate(String),

    /// No manifest registered under this id.
    #[error("unknown aspect: {0}")]
    Unknown(String),

    /// Parameters do not satisfy the manifest's schema.
    #[error("invalid params for aspect {aspect}: {message}")]
    InvalidParams {
        /// Aspect id.
        aspect: String,
        /// What was wrong.
        message: String,
    },
}

/// Binder errors. A binder error is fatal for the call that raised it,
/// never for the board: the IR and realized graph stay as they were.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BinderError {
    /// The IR is malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An aspect list cannot be lowered (unknown aspect, wrong scope).
    #[error("composition failed: {0}")]
    Composition(String),

    /// Aspects on one wire require and forbid the same trait.
    #[error("incompatible aspects on wire {wire}: {reason}")]
    Incompatible {
        /// Wire carrying the aspects.
        wire: String,
        /// Which trait conflicts.
        reason: String,
    },

    /// A plan referenced something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `initialize` was called on a binder that already holds a board.
    #[error("binder already initialized for board {0}")]
    AlreadyInitialized(String),

    /// A plan was applied before `initialize`.
    #[error("binder not initialized")]
    NotInitialized,
}

impl From<AspectError> for BinderError {
    fn from(e: AspectError) -> Self {
        BinderError::Composition(e.to_string())
    }
}

/// Graph executor errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No board initialized under this id.
    #[error("board not found: {0}")]
    BoardNotFound(String),

    /// A board with this id is already initialized.
    #[error("board already initialized: {0}")]
    BoardExists(String),

    /// The gadget is not mounted on the board.
    #[error("gadget not found on board: {0}")]
    GadgetNotFound(String),

    /// The binder rejected the mutation. Carries the receipt reason.
    #[error("plan rejected: {0}")]
    Rejected(String),

    /// A binder error raised during initialization.
    #[error("binder error: {0}")]
    Binder(#[from] BinderError),

    /// A contact store error.
    #[error("contact error: {0}")]
    Contact(#[from] ContactError),

    /// A gadget lookup or registration error.
    #[error("gadget error: {0}")]
    Gadget(#[from] GadgetError),

    /// A lattice lookup error.
    #[error("lattice error: {0}")]
    Lattice(#[from] LatticeError),
}
