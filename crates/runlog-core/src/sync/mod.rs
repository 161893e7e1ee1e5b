//! Offline-first reconciliation between the local store and the runs service.
//!
//! [`SyncEngine`] is the only writer of the local store. Every operation
//! takes the store lock for its whole read-modify-write sequence, and the
//! batch passes (`download_and_merge`, `upload_pending`, `full_sync`) are
//! additionally guarded so at most one runs at a time.

mod engine;
mod event;
mod report;

use thiserror::Error;

use crate::auth::Credential;
use crate::remote::RemoteError;

pub use engine::SyncEngine;
pub use event::SyncEvent;
pub use report::{
    DeleteFailure, DeleteOutcome, FullSyncReport, MergeReport, SaveOutcome, SkipReason,
    SyncSummary, TombstoneReport, UploadFailure, UploadReport,
};

#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store failed; nothing after the failing write was applied
    #[error("Local store error: {0}")]
    Persistence(#[from] crate::Error),
    /// A pass-level remote failure, e.g. the run list could not be fetched
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Invalid run: {0}")]
    InvalidRecord(String),
    #[error("A sync pass is already in progress")]
    SyncInProgress,
}

impl SyncError {
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Unauthorized))
    }
}

/// Identity and connectivity snapshot for one engine call
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    credential: Option<Credential>,
    online: bool,
}

impl SyncContext {
    pub const fn new(credential: Option<Credential>, online: bool) -> Self {
        Self { credential, online }
    }

    /// Never touches the remote
    pub const fn offline() -> Self {
        Self {
            credential: None,
            online: false,
        }
    }

    pub const fn is_online(&self) -> bool {
        self.online
    }

    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub const fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// The credential to use for remote calls, or why there is none
    pub(crate) fn remote_credential(&self) -> Result<&Credential, SkipReason> {
        if !self.online {
            return Err(SkipReason::Offline);
        }
        self.credential.as_ref().ok_or(SkipReason::NotAuthenticated)
    }
}
