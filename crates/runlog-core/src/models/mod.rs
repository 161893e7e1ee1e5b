//! Data models for runlog

mod run;
mod tombstone;

pub use run::{ContentKey, Run, RunId, SyncStatus};
pub use tombstone::Tombstone;
