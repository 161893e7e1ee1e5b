use std::io;

use runlog_core::auth::AuthError;
use runlog_core::remote::RemoteError;
use runlog_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] runlog_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Run ID cannot be empty")]
    EmptyRunId,
    #[error("Run not found for id/prefix: {0}")]
    RunNotFound(String),
    #[error("{0}")]
    AmbiguousRunId(String),
    #[error("Invalid date '{0}': use RFC 3339 (2025-01-01T07:00:00Z) or YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not signed in. Run `runlog auth login --email <email> --password <password>` first.")]
    NotSignedIn,
    #[error("Session expired or was revoked. Run `runlog auth login` again.")]
    SessionExpired,
    #[error("Sync is unavailable with --offline")]
    Offline,
}
