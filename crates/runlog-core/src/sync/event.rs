use crate::models::RunId;
use crate::remote::RemoteError;

/// Outcomes the engine publishes on its broadcast channel.
///
/// Background deletes report here only; nothing is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A provisional record was replaced by the server's canonical one
    RunSynced { provisional: RunId, canonical: RunId },
    /// Creating a run remotely failed; the record stays pending
    RemoteCreateFailed { id: RunId, error: RemoteError },
    /// A pending record was dropped in favour of an existing remote twin
    DuplicateDiscarded { local: RunId, remote: RunId },
    /// The server confirmed a delete and the tombstone was cleared
    RemoteDeleteConfirmed { id: RunId },
    /// A remote delete failed. `NotFound` still clears the tombstone.
    RemoteDeleteFailed { id: RunId, error: RemoteError },
}
