//! In-memory document store with epoch-aware revision assignment.
//!
//! Markers come from a single mutex-guarded clock so the epoch and the
//! sequence can never be observed mid-update. Every committed write is
//! published to the change hub before `save` returns.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::StoreError;
use crate::notify::{ChangeHub, ChangeNotification};
use crate::revision::RevisionMarker;
use crate::store::{Document, DocumentStore};

/// Assigns `(epoch, sequence)` pairs. Both fields advance under one lock.
struct RevisionClock {
    epoch: u64,
    sequence: u64,
}

impl RevisionClock {
    fn next(&mut self) -> RevisionMarker {
        self.sequence += 1;
        RevisionMarker::new(self.epoch, self.sequence)
    }

    fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.sequence = 0;
        self.epoch
    }
}

struct Stored {
    body: Value,
    marker: RevisionMarker,
}

/// DashMap-backed store used by the demo binary and the test suite.
pub struct MemoryStore {
    documents: DashMap<String, Stored>,
    clock: Mutex<RevisionClock>,
    hub: Arc<ChangeHub>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            clock: Mutex::new(RevisionClock {
                epoch: 1,
                sequence: 0,
            }),
            hub: Arc::new(ChangeHub::new()),
        }
    }

    /// Notification hub fed by this store's writes.
    pub fn changes(&self) -> Arc<ChangeHub> {
        self.hub.clone()
    }

    /// Marker of the current stored revision, if the document exists.
    pub fn revision_marker(&self, id: &str) -> Option<RevisionMarker> {
        self.documents.get(id).map(|stored| stored.marker)
    }

    /// Model a store-side structural event (restart, compaction): the epoch
    /// advances and the sequence restarts, making older sequences
    /// incomparable with new ones.
    pub fn bump_epoch(&self) -> u64 {
        let epoch = self.clock.lock().bump_epoch();
        tracing::info!(epoch, "store epoch advanced");
        epoch
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<(Document, RevisionMarker)>, StoreError> {
        Ok(self
            .documents
            .get(id)
            .map(|stored| (Document::new(id, stored.body.clone()), stored.marker)))
    }

    async fn save(
        &self,
        id: &str,
        body: Value,
        expected: Option<RevisionMarker>,
    ) -> Result<RevisionMarker, StoreError> {
        // The entry guard stays held across the optimistic check, marker
        // assignment, and write, so concurrent saves to one id serialize.
        let marker = {
            let mut entry = self.documents.entry(id.to_string());

            if let Some(expected) = expected {
                match &entry {
                    Entry::Occupied(occupied) => {
                        let actual = occupied.get().marker;
                        if actual != expected {
                            return Err(StoreError::Conflict {
                                id: id.to_string(),
                                expected,
                                actual,
                            });
                        }
                    }
                    Entry::Vacant(_) => {
                        return Err(StoreError::NotFound { id: id.to_string() });
                    }
                }
            }

            let marker = self.clock.lock().next();
            match entry {
                Entry::Occupied(ref mut occupied) => {
                    let stored = occupied.get_mut();
                    stored.body = body;
                    stored.marker = marker;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(Stored { body, marker });
                }
            }
            marker
        };

        tracing::debug!(document_id = %id, %marker, "revision stored");
        self.hub.publish(ChangeNotification::put(id, marker));
        Ok(marker)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.documents.remove(id).is_none() {
            return Err(StoreError::NotFound { id: id.to_string() });
        }

        let marker = self.clock.lock().next();
        self.hub.publish(ChangeNotification::delete(id, marker));
        Ok(())
    }
}
