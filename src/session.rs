//! Editing sessions and the refresh protocol.
//!
//! A session pins the revision marker it loaded at (the baseline) and
//! counts its own successful saves. Both live in one mutex-guarded record:
//! the save path and the notification path run concurrently, and the
//! filter must never see an incremented count next to a stale baseline.
//!
//! Phases follow `Clean -> Dirty -> Saved`, back to `Clean` only when the
//! caller accepts a refresh; further saves stay `Saved` with an
//! incrementing count.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::StoreError;
use crate::filter::{self, SessionSnapshot, Verdict};
use crate::notify::{ChangeHub, ChangeNotification};
use crate::revision::RevisionMarker;
use crate::store::{Document, DocumentStore};

/// Where the session sits in the edit/save/refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    /// Snapshot matches what was last loaded
    Clean,
    /// Local edits pending, not yet saved
    Dirty,
    /// At least one save since the last load or refresh
    Saved,
}

struct Track {
    document: Document,
    baseline: RevisionMarker,
    last_saved: RevisionMarker,
    local_saves: u64,
    phase: EditPhase,
}

/// One user's editing session over a single document.
///
/// Shareable across tasks via `Arc`; every method takes `&self`.
pub struct EditSession {
    session_id: Uuid,
    document_id: String,
    track: Mutex<Track>,
}

impl EditSession {
    /// Load a document and start a session at its current revision.
    ///
    /// An absent document reports as `Ok(None)`: no session state is
    /// created for it.
    pub async fn open<S>(store: &S, document_id: &str) -> Result<Option<EditSession>, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let Some((document, marker)) = store.load(document_id).await? else {
            return Ok(None);
        };

        let session = EditSession {
            session_id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            track: Mutex::new(Track {
                document,
                baseline: marker,
                last_saved: marker,
                local_saves: 0,
                phase: EditPhase::Clean,
            }),
        };

        tracing::debug!(
            session_id = %session.session_id,
            document_id,
            baseline = %marker,
            "session opened"
        );
        Ok(Some(session))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Clone of the current local snapshot.
    pub fn document(&self) -> Document {
        self.track.lock().document.clone()
    }

    pub fn phase(&self) -> EditPhase {
        self.track.lock().phase
    }

    /// Mutate the local snapshot body. Marks the session dirty.
    pub fn edit(&self, f: impl FnOnce(&mut Value)) {
        let mut track = self.track.lock();
        f(&mut track.document.body);
        track.phase = EditPhase::Dirty;
    }

    /// Persist the local snapshot through the store.
    ///
    /// The save count increments only after the store confirms the write;
    /// a conflicting save surfaces as [`StoreError::Conflict`] with the
    /// session counters untouched. No automatic retry.
    pub async fn save<S>(&self, store: &S) -> Result<RevisionMarker, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let (body, expected) = {
            let track = self.track.lock();
            (track.document.body.clone(), track.last_saved)
        };

        let marker = store.save(&self.document_id, body, Some(expected)).await?;

        let mut track = self.track.lock();
        track.local_saves += 1;
        track.last_saved = marker;
        track.phase = EditPhase::Saved;

        tracing::debug!(
            session_id = %self.session_id,
            document_id = %self.document_id,
            %marker,
            local_saves = track.local_saves,
            "save confirmed"
        );
        Ok(marker)
    }

    /// Atomic view of the fields the relevance filter reads.
    pub fn snapshot(&self) -> SessionSnapshot {
        let track = self.track.lock();
        SessionSnapshot {
            baseline: track.baseline,
            local_saves: track.local_saves,
        }
    }

    /// Run the change relevance filter against the current session state.
    pub fn assess(&self, notification: &ChangeNotification) -> Verdict {
        filter::assess(notification, &self.snapshot())
    }

    /// Whether the notification represents another party's change.
    pub fn is_foreign(&self, notification: &ChangeNotification) -> bool {
        filter::is_foreign_change(notification, &self.snapshot())
    }

    /// Reload the document and rebase the session on the fresh revision.
    ///
    /// This is the only path that resets the counters: baseline, save
    /// count, and phase change together under one lock.
    pub async fn refresh<S>(&self, store: &S) -> Result<(), StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let (document, marker) =
            store
                .load(&self.document_id)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    id: self.document_id.clone(),
                })?;

        let mut track = self.track.lock();
        track.document = document;
        track.baseline = marker;
        track.last_saved = marker;
        track.local_saves = 0;
        track.phase = EditPhase::Clean;

        tracing::info!(
            session_id = %self.session_id,
            document_id = %self.document_id,
            baseline = %marker,
            "session refreshed"
        );
        Ok(())
    }

    /// Subscribe this session to the hub and forward only foreign changes.
    ///
    /// Own-change notifications are filtered out before they reach the
    /// caller, who is expected to answer each forwarded verdict with a
    /// refresh prompt.
    pub fn watch_foreign(self: Arc<Self>, hub: &ChangeHub) -> ForeignChangeWatch {
        let mut subscription = hub.for_document(&self.document_id);
        let session = self;
        let (tx, rx) = mpsc::channel(64);

        let handle = tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                let verdict = session.assess(&notification);
                if !verdict.foreign {
                    continue;
                }
                if tx.send((notification, verdict)).await.is_err() {
                    break;
                }
            }
        });

        ForeignChangeWatch { handle, rx }
    }
}

/// Handle to a spawned foreign-change consumer.
///
/// Unsubscribing (or dropping) aborts the task, so no further filter
/// invocations happen; notifications already in flight are discarded.
pub struct ForeignChangeWatch {
    handle: JoinHandle<()>,
    rx: mpsc::Receiver<(ChangeNotification, Verdict)>,
}

impl ForeignChangeWatch {
    /// Next foreign change, or `None` once the stream ends.
    pub async fn recv(&mut self) -> Option<(ChangeNotification, Verdict)> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for ForeignChangeWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    /// Drive the store's sequence to `target` with anonymous writes.
    async fn seed_to_sequence(store: &MemoryStore, id: &str, target: u64) -> RevisionMarker {
        let mut marker = None;
        for i in 0..target {
            marker = Some(
                store
                    .save(id, json!({"name": format!("rev-{i}")}), None)
                    .await
                    .unwrap(),
            );
        }
        marker.unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_document_creates_no_session() {
        let store = MemoryStore::new();
        let session = EditSession::open(&store, "categories/404").await.unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_open_captures_baseline_once() {
        let store = MemoryStore::new();
        let seeded = seed_to_sequence(&store, "categories/1", 3).await;

        let session = EditSession::open(&store, "categories/1")
            .await
            .unwrap()
            .unwrap();
        let snap = session.snapshot();
        assert_eq!(snap.baseline, seeded);
        assert_eq!(snap.local_saves, 0);
        assert_eq!(session.phase(), EditPhase::Clean);
    }

    #[tokio::test]
    async fn test_save_increments_count_but_keeps_baseline() {
        let store = MemoryStore::new();
        let seeded = seed_to_sequence(&store, "categories/1", 1).await;

        let session = EditSession::open(&store, "categories/1")
            .await
            .unwrap()
            .unwrap();
        session.edit(|body| body["name"] = json!("Beverages"));
        assert_eq!(session.phase(), EditPhase::Dirty);

        session.save(&store).await.unwrap();
        session.save(&store).await.unwrap();

        let snap = session.snapshot();
        assert_eq!(snap.baseline, seeded);
        assert_eq!(snap.local_saves, 2);
        assert_eq!(session.phase(), EditPhase::Saved);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_counters_untouched() {
        let store = MemoryStore::new();
        seed_to_sequence(&store, "categories/1", 1).await;

        let session = EditSession::open(&store, "categories/1")
            .await
            .unwrap()
            .unwrap();

        // Another writer moves the stored revision forward
        let foreign = store.revision_marker("categories/1").unwrap();
        store
            .save("categories/1", json!({"name": "Seafood"}), Some(foreign))
            .await
            .unwrap();

        let err = session.save(&store).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(session.snapshot().local_saves, 0);
    }

    #[tokio::test]
    async fn test_own_save_explained_next_revision_foreign() {
        let store = MemoryStore::new();
        seed_to_sequence(&store, "categories/1", 5).await;

        let session = EditSession::open(&store, "categories/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.snapshot().baseline, RevisionMarker::new(1, 5));

        let own = session.save(&store).await.unwrap();
        assert_eq!(own, RevisionMarker::new(1, 6));
        assert!(!session.is_foreign(&ChangeNotification::put("categories/1", own)));

        assert!(session.is_foreign(&ChangeNotification::put(
            "categories/1",
            RevisionMarker::new(1, 7)
        )));
    }

    #[tokio::test]
    async fn test_refresh_resets_baseline_and_count_together() {
        let store = MemoryStore::new();
        seed_to_sequence(&store, "categories/1", 1).await;

        let session = EditSession::open(&store, "categories/1")
            .await
            .unwrap()
            .unwrap();
        session.save(&store).await.unwrap();

        // Foreign write, then the user accepts the refresh
        let current = store.revision_marker("categories/1").unwrap();
        let fresh = store
            .save("categories/1", json!({"name": "Produce"}), Some(current))
            .await
            .unwrap();

        session.refresh(&store).await.unwrap();

        let snap = session.snapshot();
        assert_eq!(snap.local_saves, 0);
        assert_eq!(snap.baseline, fresh);
        assert_eq!(session.phase(), EditPhase::Clean);
        assert_eq!(session.document().field("name"), Some("Produce"));
    }

    #[tokio::test]
    async fn test_watch_forwards_only_foreign_changes() {
        let store = MemoryStore::new();
        seed_to_sequence(&store, "categories/1", 1).await;

        let session = Arc::new(
            EditSession::open(&store, "categories/1")
                .await
                .unwrap()
                .unwrap(),
        );
        let own = session.save(&store).await.unwrap();

        let mut watch = session.clone().watch_foreign(&store.changes());

        // Own-save notification redelivered after the count is confirmed:
        // filtered out before it reaches the caller
        store.changes().publish(ChangeNotification::put("categories/1", own));

        // Foreign save: forwarded
        let current = store.revision_marker("categories/1").unwrap();
        let foreign = store
            .save("categories/1", json!({"name": "Seafood"}), Some(current))
            .await
            .unwrap();

        let (notification, verdict) =
            tokio::time::timeout(std::time::Duration::from_secs(1), watch.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(notification.marker, foreign);
        assert!(verdict.foreign);
    }

    #[tokio::test]
    async fn test_unsubscribed_watch_delivers_nothing() {
        let store = MemoryStore::new();
        seed_to_sequence(&store, "categories/1", 1).await;

        let session = Arc::new(
            EditSession::open(&store, "categories/1")
                .await
                .unwrap()
                .unwrap(),
        );
        let watch = session.clone().watch_foreign(&store.changes());
        watch.unsubscribe();

        // Writes after unsubscribe trigger no filter deliveries
        let current = store.revision_marker("categories/1").unwrap();
        store
            .save("categories/1", json!({"name": "Seafood"}), Some(current))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store.changes().subscriber_count("categories/1"), 0);
    }
}
