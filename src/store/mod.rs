pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::revision::RevisionMarker;

/// Schema-free document: an id plus a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Read a top-level string field from the body.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }
}

/// Document store collaborator.
///
/// `save` takes the marker the caller last observed; `Some(marker)` enforces
/// the optimistic check and fails with [`StoreError::Conflict`] when the
/// stored revision has moved past it. `None` skips the check (create or
/// last-writer-wins overwrite).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document and the marker of its current stored revision.
    /// Absent documents report as `Ok(None)`.
    async fn load(&self, id: &str) -> Result<Option<(Document, RevisionMarker)>, StoreError>;

    /// Persist a new revision of the document body, returning its marker.
    async fn save(
        &self,
        id: &str,
        body: Value,
        expected: Option<RevisionMarker>,
    ) -> Result<RevisionMarker, StoreError>;

    /// Remove a document. Deleting an absent id is an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
