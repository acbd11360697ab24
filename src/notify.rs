//! Change notification source.
//!
//! The store publishes a [`ChangeNotification`] for every committed write.
//! Consumers subscribe per document id and receive a lazy, unbounded,
//! non-restartable stream of notifications until they unsubscribe or the
//! hub is dropped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::revision::RevisionMarker;

/// Notifications buffered per document before a slow receiver lags.
const CHANNEL_CAPACITY: usize = 1000;

/// What happened to the document on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Put,
    Delete,
}

/// Event delivered asynchronously for every server-side revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Identifier of the document that changed
    pub document_id: String,

    /// Marker of the document state that triggered the notification
    pub marker: RevisionMarker,

    /// Type of server-side change
    pub kind: ChangeKind,

    /// Server-side timestamp of the change
    pub at: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn put(document_id: impl Into<String>, marker: RevisionMarker) -> Self {
        Self {
            document_id: document_id.into(),
            marker,
            kind: ChangeKind::Put,
            at: Utc::now(),
        }
    }

    pub fn delete(document_id: impl Into<String>, marker: RevisionMarker) -> Self {
        Self {
            document_id: document_id.into(),
            marker,
            kind: ChangeKind::Delete,
            at: Utc::now(),
        }
    }
}

/// Per-document publish/subscribe hub for change notifications.
///
/// One broadcast channel per document id, created lazily on the first
/// publish or subscribe. Senders are kept alive by the hub so a document
/// with no current subscribers does not lose its channel.
pub struct ChangeHub {
    channels: DashMap<String, broadcast::Sender<ChangeNotification>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn sender(&self, document_id: &str) -> broadcast::Sender<ChangeNotification> {
        self.channels
            .entry(document_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish a notification to all subscribers of its document.
    ///
    /// Notifications for documents nobody watches are dropped.
    pub fn publish(&self, notification: ChangeNotification) {
        let tx = self.sender(&notification.document_id);
        let _ = tx.send(notification);
    }

    /// Subscribe to changes for a single document id.
    pub fn for_document(&self, document_id: &str) -> Subscription {
        Subscription {
            document_id: document_id.to_string(),
            rx: self.sender(document_id).subscribe(),
        }
    }

    /// Number of live subscribers for a document.
    pub fn subscriber_count(&self, document_id: &str) -> usize {
        self.channels
            .get(document_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable subscription to one document's notification stream.
///
/// Dropping the subscription unsubscribes; [`Subscription::unsubscribe`]
/// makes the intent explicit at call sites.
pub struct Subscription {
    document_id: String,
    rx: broadcast::Receiver<ChangeNotification>,
}

impl Subscription {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Receive the next notification.
    ///
    /// A lagged receiver skips to the oldest retained notification rather
    /// than erroring out; the stream only ends when the hub goes away.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        document_id = %self.document_id,
                        skipped,
                        "notification subscriber lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving. Notifications already in flight are discarded.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_publish_reaches_document_subscriber() {
        let hub = ChangeHub::new();
        let mut sub = hub.for_document("categories/1");

        hub.publish(ChangeNotification::put(
            "categories/1",
            RevisionMarker::new(1, 6),
        ));

        let n = timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.document_id, "categories/1");
        assert_eq!(n.marker, RevisionMarker::new(1, 6));
        assert_eq!(n.kind, ChangeKind::Put);
    }

    #[tokio::test]
    async fn test_subscription_is_scoped_to_one_document() {
        let hub = ChangeHub::new();
        let mut sub = hub.for_document("categories/1");

        hub.publish(ChangeNotification::put(
            "categories/2",
            RevisionMarker::new(1, 9),
        ));

        let got = timeout(Duration::from_millis(100), sub.recv()).await;
        assert!(got.is_err(), "notification for another document leaked");
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_receiver() {
        let hub = ChangeHub::new();
        let sub = hub.for_document("categories/1");
        assert_eq!(hub.subscriber_count("categories/1"), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count("categories/1"), 0);
    }
}
