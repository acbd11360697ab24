//! # Coedit - Collaborative Edit Conflict Detector
//!
//! Optimistic-concurrency conflict detection for collaborative document
//! editing: sessions track the revision they loaded at and count their own
//! saves, so inbound change notifications can be split into "my own save
//! echoing back" and "somebody else touched this document".
//!
//! ## Features
//!
//! - **Change Relevance Filter**: pure predicate over `(epoch, sequence)`
//!   revision markers, tolerant of store restarts and out-of-order markers
//! - **Refresh Protocol**: Clean/Dirty/Saved session phases with a single
//!   atomic reset path when the user accepts a refresh
//! - **Cancellable subscriptions**: per-document notification streams with
//!   explicit unsubscribe semantics
//! - **In-memory store**: epoch-aware revision clock with optimistic save
//!   checks, usable as a test double or demo backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use coedit::{DocumentStore, EditSession, MemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryStore::new();
//!     store.save("categories/1", json!({"name": "Beverages"}), None).await?;
//!
//!     let session = Arc::new(
//!         EditSession::open(&store, "categories/1").await?.expect("seeded above"),
//!     );
//!     let mut foreign = session.clone().watch_foreign(&store.changes());
//!
//!     session.edit(|body| body["name"] = json!("Drinks"));
//!     session.save(&store).await?;
//!
//!     while let Some((change, _verdict)) = foreign.recv().await {
//!         println!("changed on the server at {}, refresh?", change.marker);
//!         session.refresh(&store).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod filter;
pub mod notify;
pub mod revision;
pub mod session;
pub mod store;

// Re-export main types for library consumers
pub use error::StoreError;
pub use filter::{is_foreign_change, RecommendedAction, SessionSnapshot, Verdict};
pub use notify::{ChangeHub, ChangeKind, ChangeNotification, Subscription};
pub use revision::RevisionMarker;
pub use session::{EditPhase, EditSession, ForeignChangeWatch};
pub use store::{Document, DocumentStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
