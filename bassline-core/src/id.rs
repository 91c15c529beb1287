//! Typed ID wrappers for boards, gadgets, wires, contacts and graph elements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up gadget IDs, wire IDs, etc.
/// These are just strings underneath. Graph node and edge IDs are
/// content-derived by the binder; everything else is caller-chosen.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the ID is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(BoardId, "Unique identifier for a board (one network).");
typed_id!(GadgetId, "Identifier of a mounted gadget instance.");
typed_id!(WireId, "Identifier of a declared wire.");
typed_id!(AspectId, "Identifier of an aspect manifest.");
typed_id!(ContactId, "Identifier of a contact in a contact store.");
typed_id!(ConnectionId, "Identifier of a connection between two contacts.");
typed_id!(NodeId, "Content-derived identifier of a realized-graph node.");
typed_id!(EdgeId, "Content-derived identifier of a realized-graph edge.");
typed_id!(ReceiptId, "Identifier of a receipt within a board's history.");

impl ContactId {
    /// The contact that holds `pin` of the realized-graph node `node`.
    pub fn for_pin(node: &NodeId, pin: &str) -> Self {
        Self(format!("{}.{}", node.0, pin))
    }
}
