use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::{Run, RunId, Tombstone};
use crate::remote::RemoteError;

/// Why a remote pass did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NotAuthenticated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::NotAuthenticated => write!(f, "not signed in"),
        }
    }
}

/// Result of `save_record`. Remote failures are reported, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The record as stored locally
    pub run: Run,
    /// The save matched an existing record and wrote nothing
    pub deduplicated: bool,
    /// Set when the remote create was attempted and failed
    pub remote_error: Option<RemoteError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub removed: Option<Run>,
    /// A tombstone was written because the server may hold the run
    pub tombstoned: bool,
    /// A background remote delete was started
    pub remote_attempted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub skipped: Option<SkipReason>,
    pub fetched: usize,
    pub inserted: usize,
    /// Local pending records replaced by their remote twin
    pub absorbed: usize,
    pub already_present: usize,
    pub skipped_tombstoned: usize,
    /// Remote records whose content matched another remote record
    pub remote_duplicates: usize,
    pub tombstones_cleared: usize,
}

impl MergeReport {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub id: RunId,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub skipped: Option<SkipReason>,
    /// Local records absent from the remote list
    pub candidates: usize,
    pub uploaded: usize,
    pub discarded_duplicates: usize,
    /// Pending records the server already had under the same id
    pub marked_synced: usize,
    pub failed: Vec<UploadFailure>,
}

impl UploadReport {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_none() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub id: RunId,
    pub error: RemoteError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TombstoneReport {
    pub skipped: Option<SkipReason>,
    pub confirmed: usize,
    pub failed: Vec<DeleteFailure>,
}

impl TombstoneReport {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullSyncReport {
    pub tombstones: TombstoneReport,
    pub merge: MergeReport,
    pub upload: UploadReport,
}

/// Local state at a glance, for `runlog status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub pending: usize,
    pub synced: usize,
    pub tombstones: Vec<Tombstone>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub syncing: bool,
}
