//! Change relevance filter.
//!
//! Decides whether an inbound change notification was caused by somebody
//! other than the current editing session. A session remembers the marker
//! it loaded at (the baseline) and counts its own saves; the server's
//! observed sequence advancement is compared against that count.
//!
//! The per-save count is an approximation: it assumes every save advances
//! the server sequence by exactly one. A store that batches writes can
//! advance by more, which this filter reports as a foreign change, the
//! conservative direction.

use serde::{Deserialize, Serialize};

use crate::notify::ChangeNotification;
use crate::revision::RevisionMarker;

/// Torn-state-free view of the session fields the filter reads.
///
/// Both fields are captured under one lock, so a concurrent save can never
/// be observed as an incremented count paired with a stale baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Marker captured at the most recent load or refresh
    pub baseline: RevisionMarker,

    /// Successful local saves since the baseline was captured
    pub local_saves: u64,
}

/// What the caller should do about a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    /// Foreign change: prompt the user to reload the document
    OfferRefresh,
    /// Explained by this session's own saves
    Ignore,
}

/// Filter outcome: the foreign/own decision plus the recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub foreign: bool,
    pub action: RecommendedAction,
}

impl Verdict {
    fn foreign() -> Self {
        Self {
            foreign: true,
            action: RecommendedAction::OfferRefresh,
        }
    }

    fn own() -> Self {
        Self {
            foreign: false,
            action: RecommendedAction::Ignore,
        }
    }
}

/// Decide whether `notification` represents a change made by another party.
///
/// Pure predicate: same inputs, same answer, no side effects.
///
/// 1. No local saves since load: every notification is foreign.
/// 2. Epoch mismatch (store restart/compaction, or a malformed marker):
///    sequences are not comparable, treated as foreign rather than risking
///    a swallowed external change.
/// 3. Same epoch: foreign iff the server advanced further past the baseline
///    than this session's own saves account for.
pub fn is_foreign_change(notification: &ChangeNotification, session: &SessionSnapshot) -> bool {
    if session.local_saves == 0 {
        return true;
    }

    match notification.marker.advance_from(&session.baseline) {
        None => true,
        Some(delta) => delta > session.local_saves,
    }
}

/// [`is_foreign_change`] packaged with the recommended caller action.
pub fn assess(notification: &ChangeNotification, session: &SessionSnapshot) -> Verdict {
    if is_foreign_change(notification, session) {
        Verdict::foreign()
    } else {
        Verdict::own()
    }
}
