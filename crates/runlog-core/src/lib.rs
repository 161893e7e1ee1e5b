//! runlog-core - Core library for runlog
//!
//! This crate contains the run model, the local `SQLite` store, the remote
//! runs API client, and the sync engine that reconciles the two.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
pub use models::{ContentKey, Run, RunId, SyncStatus};
pub use sync::{SyncContext, SyncEngine, SyncError};
