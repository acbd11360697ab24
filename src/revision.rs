//! Store-assigned revision markers.
//!
//! A marker is an `(epoch, sequence)` pair. The sequence increases
//! monotonically while the store runs; the epoch is bumped on structural
//! events (restart, compaction), at which point the sequence restarts and
//! sequences from different epochs stop being comparable.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version identifier assigned by the document store to each stored revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionMarker {
    pub epoch: u64,
    pub sequence: u64,
}

impl RevisionMarker {
    pub fn new(epoch: u64, sequence: u64) -> Self {
        Self { epoch, sequence }
    }

    /// Whether `other` was assigned in the same store epoch as `self`.
    pub fn same_epoch(&self, other: &RevisionMarker) -> bool {
        self.epoch == other.epoch
    }

    /// Sequence distance from `baseline` to `self` within one epoch.
    ///
    /// Returns `None` on an epoch mismatch, since sequences from different
    /// epochs are not comparable. A sequence regression inside the same
    /// epoch saturates to zero.
    pub fn advance_from(&self, baseline: &RevisionMarker) -> Option<u64> {
        if !self.same_epoch(baseline) {
            return None;
        }
        Some(self.sequence.saturating_sub(baseline.sequence))
    }
}

impl fmt::Display for RevisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.epoch, self.sequence)
    }
}

impl FromStr for RevisionMarker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (epoch, sequence) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("Invalid revision marker format: {}", s))?;

        let epoch = epoch.parse().context("Failed to parse marker epoch")?;
        let sequence = sequence
            .parse()
            .context("Failed to parse marker sequence")?;

        Ok(Self { epoch, sequence })
    }
}
