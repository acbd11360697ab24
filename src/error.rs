//! Typed errors surfaced at the document store seam.
//!
//! Application-level composition stays on `anyhow`; the store reports
//! through [`StoreError`] so callers can tell a missing document from an
//! optimistic concurrency conflict without string matching.

use thiserror::Error;

use crate::revision::RevisionMarker;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No document stored under this id
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// Optimistic check failed: the stored marker moved past what the
    /// caller last observed
    #[error("save conflict on {id}: expected revision {expected}, store has {actual}")]
    Conflict {
        id: String,
        expected: RevisionMarker,
        actual: RevisionMarker,
    },

    /// The store shut down while the operation was pending
    #[error("document store closed")]
    Closed,
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
