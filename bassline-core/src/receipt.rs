//! Receipts: the immutable audit trail of graph mutations.

use crate::graph::GraphDiff;
use crate::id::ReceiptId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a mutation was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Accepted; the diffs were applied.
    Ok,
    /// Rejected; nothing changed.
    Error,
}

/// Who did it, when, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Acting principal.
    pub by: String,
    /// When the mutation was processed.
    pub at: DateTime<Utc>,
    /// Human-readable reason; the error message for rejected mutations.
    pub reason: String,
}

/// Record of one accepted or rejected mutation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// `"{board}#{sequence}"`.
    pub id: ReceiptId,
    /// Outcome.
    pub status: ReceiptStatus,
    /// Graph changes, empty for rejected mutations.
    pub diffs: Vec<GraphDiff>,
    /// Provenance.
    pub prov: Provenance,
}

impl Receipt {
    /// An accepted mutation.
    pub fn ok(id: ReceiptId, diffs: Vec<GraphDiff>, by: &str, reason: impl Into<String>) -> Self {
        Self::build(id, ReceiptStatus::Ok, diffs, by, reason.into())
    }

    /// A rejected mutation.
    pub fn error(id: ReceiptId, by: &str, reason: impl Into<String>) -> Self {
        Self::build(id, ReceiptStatus::Error, Vec::new(), by, reason.into())
    }

    fn build(
        id: ReceiptId,
        status: ReceiptStatus,
        diffs: Vec<GraphDiff>,
        by: &str,
        reason: String,
    ) -> Self {
        Self {
            id,
            status,
            diffs,
            prov: Provenance {
                by: by.to_owned(),
                at: Utc::now(),
                reason,
            },
        }
    }

    /// True if the mutation was accepted.
    pub fn is_ok(&self) -> bool {
        self.status == ReceiptStatus::Ok
    }
}
