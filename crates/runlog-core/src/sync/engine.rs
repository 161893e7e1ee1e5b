use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::event::SyncEvent;
use super::report::{
    DeleteFailure, DeleteOutcome, FullSyncReport, MergeReport, SaveOutcome, SyncSummary,
    TombstoneReport, UploadFailure, UploadReport,
};
use super::{SyncContext, SyncError};
use crate::auth::Credential;
use crate::db::RunRepository;
use crate::models::{ContentKey, Run, RunId, SyncStatus};
use crate::remote::{NewRun, RemoteClient, RemoteError, RemoteRun};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Clears the in-flight flag when a pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::SyncInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncEngine<S, R> {
    store: Arc<Mutex<S>>,
    remote: Arc<R>,
    events: broadcast::Sender<SyncEvent>,
    syncing: AtomicBool,
    background: std::sync::Mutex<JoinSet<()>>,
}

impl<S, R> SyncEngine<S, R>
where
    S: RunRepository + Send + 'static,
    R: RemoteClient,
{
    pub fn new(store: S, remote: R) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: Arc::new(Mutex::new(store)),
            remote: Arc::new(remote),
            events,
            syncing: AtomicBool::new(false),
            background: std::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// All local runs, newest first
    pub async fn runs(&self) -> Result<Vec<Run>, SyncError> {
        Ok(self.store.lock().await.list()?)
    }

    pub async fn run(&self, id: &RunId) -> Result<Option<Run>, SyncError> {
        Ok(self.store.lock().await.get(id)?)
    }

    pub async fn summary(&self) -> Result<SyncSummary, SyncError> {
        let store = self.store.lock().await;
        let runs = store.list()?;
        let pending = runs
            .iter()
            .filter(|run| run.status == SyncStatus::Pending)
            .count();
        Ok(SyncSummary {
            total: runs.len(),
            pending,
            synced: runs.len() - pending,
            tombstones: store.list_tombstones()?,
            last_sync_at: store.last_sync_at()?,
            syncing: self.is_syncing(),
        })
    }

    /// Store a new run, pushing it to the server when possible.
    ///
    /// A run whose content matches an existing record is not stored again;
    /// the existing record is returned instead.
    pub async fn save_record(
        &self,
        candidate: Run,
        ctx: &SyncContext,
    ) -> Result<SaveOutcome, SyncError> {
        candidate
            .validate()
            .map_err(|error| SyncError::InvalidRecord(error.to_string()))?;
        let candidate = candidate.with_status(SyncStatus::Pending);

        let store = self.store.lock().await;
        if let Some(existing) = store.find_by_content_key(&candidate.content_key())? {
            debug!(
                "Run {} matches existing run {}, nothing to save",
                candidate.id, existing.id
            );
            return Ok(SaveOutcome {
                run: existing,
                deduplicated: true,
                remote_error: None,
            });
        }

        let remote_error = match ctx.remote_credential() {
            Ok(credential) => match self.create_remote(credential, &candidate).await {
                Ok(canonical) => {
                    store.replace(&candidate.id, &canonical)?;
                    info!("Saved run {} (server id)", canonical.id);
                    self.publish(SyncEvent::RunSynced {
                        provisional: candidate.id,
                        canonical: canonical.id,
                    });
                    return Ok(SaveOutcome {
                        run: canonical,
                        deduplicated: false,
                        remote_error: None,
                    });
                }
                Err(error) => {
                    warn!("Remote create for run {} failed: {error}", candidate.id);
                    self.publish(SyncEvent::RemoteCreateFailed {
                        id: candidate.id,
                        error: error.clone(),
                    });
                    Some(error)
                }
            },
            Err(reason) => {
                debug!("Saving run {} locally only ({reason})", candidate.id);
                None
            }
        };

        store.insert(&candidate)?;
        info!("Saved run {} as pending", candidate.id);
        Ok(SaveOutcome {
            run: candidate,
            deduplicated: false,
            remote_error,
        })
    }

    /// Remove a run locally, then delete it remotely in the background.
    ///
    /// Pending runs were never on the server and are simply dropped. Anything
    /// else leaves a tombstone so later merges cannot bring it back.
    pub async fn delete_record(
        &self,
        id: &RunId,
        ctx: &SyncContext,
    ) -> Result<DeleteOutcome, SyncError> {
        let store = self.store.lock().await;
        let local_only = store
            .get(id)?
            .is_some_and(|run| run.status == SyncStatus::Pending);

        if local_only {
            let removed = store.delete(id)?;
            info!("Deleted pending run {id}");
            return Ok(DeleteOutcome {
                removed,
                tombstoned: false,
                remote_attempted: false,
            });
        }

        let removed = store.delete_and_tombstone(id)?;
        drop(store);
        info!("Deleted run {id}, remote delete pending");

        let remote_attempted = match ctx.remote_credential() {
            Ok(credential) => {
                self.spawn_remote_delete(*id, credential.clone());
                true
            }
            Err(reason) => {
                debug!("Remote delete for {id} deferred ({reason})");
                false
            }
        };

        Ok(DeleteOutcome {
            removed,
            tombstoned: true,
            remote_attempted,
        })
    }

    /// Wait for background remote deletes started by `delete_record`
    pub async fn wait_for_background(&self) {
        let mut tasks = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                warn!("Background remote delete did not finish: {join_error}");
            }
        }
    }

    /// Pull the server's runs into the local store
    pub async fn download_and_merge(&self, ctx: &SyncContext) -> Result<MergeReport, SyncError> {
        let _pass = PassGuard::acquire(&self.syncing)?;
        self.merge_remote(ctx).await
    }

    /// Push every local run the server does not have
    pub async fn upload_pending(&self, ctx: &SyncContext) -> Result<UploadReport, SyncError> {
        let _pass = PassGuard::acquire(&self.syncing)?;
        self.push_local(ctx).await
    }

    /// Retry remote deletes for every outstanding tombstone
    pub async fn flush_tombstones(&self, ctx: &SyncContext) -> Result<TombstoneReport, SyncError> {
        let _pass = PassGuard::acquire(&self.syncing)?;
        self.flush_deletes(ctx).await
    }

    /// Tombstones, then download, then upload, as one guarded pass
    pub async fn full_sync(&self, ctx: &SyncContext) -> Result<FullSyncReport, SyncError> {
        let _pass = PassGuard::acquire(&self.syncing)?;
        let tombstones = self.flush_deletes(ctx).await?;
        let merge = self.merge_remote(ctx).await?;
        let upload = self.push_local(ctx).await?;
        Ok(FullSyncReport {
            tombstones,
            merge,
            upload,
        })
    }

    async fn merge_remote(&self, ctx: &SyncContext) -> Result<MergeReport, SyncError> {
        let credential = match ctx.remote_credential() {
            Ok(credential) => credential,
            Err(reason) => return Ok(MergeReport::skipped(reason)),
        };

        let store = self.store.lock().await;
        let remote_runs = self.fetch_remote(credential).await?;
        let remote_ids: HashSet<RunId> = remote_runs.iter().map(|run| run.id).collect();
        let tombstoned: HashSet<RunId> = store
            .list_tombstones()?
            .into_iter()
            .map(|tombstone| tombstone.id)
            .collect();

        let local = store.list()?;
        let mut statuses: HashMap<RunId, SyncStatus> =
            local.iter().map(|run| (run.id, run.status)).collect();
        let mut owners: HashMap<ContentKey, RunId> =
            local.iter().map(|run| (run.content_key(), run.id)).collect();

        let mut report = MergeReport {
            fetched: remote_runs.len(),
            ..MergeReport::default()
        };

        for remote_run in remote_runs {
            let id = remote_run.id;
            if tombstoned.contains(&id) {
                debug!("Skipping remote run {id}, deleted locally");
                report.skipped_tombstoned += 1;
                continue;
            }

            if let Some(status) = statuses.get(&id).copied() {
                if status != SyncStatus::Synced {
                    store.set_status(&id, SyncStatus::Synced)?;
                    statuses.insert(id, SyncStatus::Synced);
                }
                report.already_present += 1;
                continue;
            }

            let key = remote_run.content_key();
            match owners.get(&key).copied() {
                Some(owner) if remote_ids.contains(&owner) => {
                    warn!("Remote run {id} duplicates remote run {owner}, keeping {owner}");
                    report.remote_duplicates += 1;
                }
                Some(owner) => {
                    store.replace(&owner, &remote_run)?;
                    debug!("Local run {owner} absorbed by remote run {id}");
                    statuses.remove(&owner);
                    statuses.insert(id, SyncStatus::Synced);
                    owners.insert(key, id);
                    report.absorbed += 1;
                }
                None => {
                    store.insert(&remote_run)?;
                    statuses.insert(id, SyncStatus::Synced);
                    owners.insert(key, id);
                    report.inserted += 1;
                }
            }
        }

        for id in tombstoned.difference(&remote_ids) {
            store.clear_tombstone(id)?;
            report.tombstones_cleared += 1;
        }

        store.set_last_sync_at(Utc::now())?;
        info!(
            "Merged {} remote runs: {} new, {} absorbed, {} duplicates skipped",
            report.fetched, report.inserted, report.absorbed, report.remote_duplicates
        );
        Ok(report)
    }

    async fn push_local(&self, ctx: &SyncContext) -> Result<UploadReport, SyncError> {
        let credential = match ctx.remote_credential() {
            Ok(credential) => credential,
            Err(reason) => return Ok(UploadReport::skipped(reason)),
        };

        let store = self.store.lock().await;
        let remote_runs = self.fetch_remote(credential).await?;
        let remote_ids: HashSet<RunId> = remote_runs.iter().map(|run| run.id).collect();
        let tombstoned: HashSet<RunId> = store
            .list_tombstones()?
            .into_iter()
            .map(|tombstone| tombstone.id)
            .collect();
        let mut twins: HashMap<ContentKey, Run> = HashMap::new();
        for run in remote_runs {
            if !tombstoned.contains(&run.id) {
                twins.entry(run.content_key()).or_insert(run);
            }
        }

        let mut report = UploadReport::default();
        for run in store.list()? {
            if remote_ids.contains(&run.id) {
                if run.status != SyncStatus::Synced {
                    store.set_status(&run.id, SyncStatus::Synced)?;
                    report.marked_synced += 1;
                }
                continue;
            }

            report.candidates += 1;
            if let Some(twin) = twins.get(&run.content_key()) {
                store.replace(&run.id, twin)?;
                debug!("Run {} already on server as {}", run.id, twin.id);
                self.publish(SyncEvent::DuplicateDiscarded {
                    local: run.id,
                    remote: twin.id,
                });
                report.discarded_duplicates += 1;
                continue;
            }

            match self.create_remote(credential, &run).await {
                Ok(canonical) => {
                    store.replace(&run.id, &canonical)?;
                    self.publish(SyncEvent::RunSynced {
                        provisional: run.id,
                        canonical: canonical.id,
                    });
                    report.uploaded += 1;
                }
                Err(error) => {
                    warn!("Upload of run {} failed: {error}", run.id);
                    self.publish(SyncEvent::RemoteCreateFailed {
                        id: run.id,
                        error: error.clone(),
                    });
                    report.failed.push(UploadFailure { id: run.id, error });
                }
            }
        }

        info!(
            "Uploaded {} of {} local runs ({} failed)",
            report.uploaded,
            report.candidates,
            report.failed.len()
        );
        Ok(report)
    }

    async fn flush_deletes(&self, ctx: &SyncContext) -> Result<TombstoneReport, SyncError> {
        let credential = match ctx.remote_credential() {
            Ok(credential) => credential,
            Err(reason) => return Ok(TombstoneReport::skipped(reason)),
        };

        let store = self.store.lock().await;
        let mut report = TombstoneReport::default();
        for tombstone in store.list_tombstones()? {
            let result = self.remote.delete(credential, &tombstone.id).await;
            let event = settle_tombstone(&*store, &tombstone.id, result)?;
            match &event {
                SyncEvent::RemoteDeleteFailed { id, error } if *error != RemoteError::NotFound => {
                    report.failed.push(DeleteFailure {
                        id: *id,
                        error: error.clone(),
                    });
                }
                _ => report.confirmed += 1,
            }
            self.publish(event);
        }
        Ok(report)
    }

    async fn fetch_remote(&self, credential: &Credential) -> Result<Vec<Run>, SyncError> {
        let remote_runs = self.remote.list(credential).await.map_err(|error| {
            warn!("Listing remote runs failed: {error}");
            error
        })?;
        let runs = remote_runs
            .into_iter()
            .map(RemoteRun::into_run)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    async fn create_remote(&self, credential: &Credential, run: &Run) -> Result<Run, RemoteError> {
        self.remote
            .create(credential, &NewRun::from(run))
            .await
            .and_then(RemoteRun::into_run)
    }

    fn spawn_remote_delete(&self, id: RunId, credential: Credential) {
        let store = Arc::clone(&self.store);
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();

        let task = async move {
            let result = remote.delete(&credential, &id).await;
            let store = store.lock().await;
            match settle_tombstone(&*store, &id, result) {
                Ok(event) => {
                    let _ = events.send(event);
                }
                Err(store_error) => {
                    error!("Failed to record remote delete outcome for {id}: {store_error}");
                }
            }
        };

        let mut background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while background.try_join_next().is_some() {}
        background.spawn(task);
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Apply one remote delete result to the tombstone table.
///
/// Success and 404 both mean the server no longer holds the run.
fn settle_tombstone<S: RunRepository>(
    store: &S,
    id: &RunId,
    result: Result<(), RemoteError>,
) -> crate::Result<SyncEvent> {
    match result {
        Ok(()) => {
            store.clear_tombstone(id)?;
            debug!("Remote delete of {id} confirmed");
            Ok(SyncEvent::RemoteDeleteConfirmed { id: *id })
        }
        Err(RemoteError::NotFound) => {
            store.clear_tombstone(id)?;
            info!("Run {id} was already gone from the server");
            Ok(SyncEvent::RemoteDeleteFailed {
                id: *id,
                error: RemoteError::NotFound,
            })
        }
        Err(error) => {
            store.record_tombstone_failure(id, &error.to_string())?;
            warn!("Remote delete of {id} failed: {error}");
            Ok(SyncEvent::RemoteDeleteFailed { id: *id, error })
        }
    }
}
