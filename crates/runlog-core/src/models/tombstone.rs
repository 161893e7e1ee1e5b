//! Tombstone model for locally deleted runs awaiting remote confirmation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RunId, SyncStatus};

/// A run removed locally whose remote delete has not been confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted run
    pub id: RunId,
    /// When the local delete happened
    pub deleted_at: DateTime<Utc>,
    /// Remote delete attempts that failed so far
    pub attempts: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl Tombstone {
    /// Tombstones are always in the pending-delete state while stored
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        SyncStatus::TombstonePending
    }
}
