//! Folder synchronizer - mirrors one remote folder and its subtree
//!
//! Children are fanned out as independent tasks, each admitted through the
//! shared pool before it is spawned. The folder waits for every dispatched
//! child and only then decides whether it may delete itself remotely:
//! deletion requires that it was asked for, that every child finished
//! cleanly (files deleted remotely, subfolders deleted remotely) and that
//! dispatch was not cut short by cancellation.

use crate::engine::admission::{AdmissionPool, AdmissionToken};
use crate::engine::fetcher::FileFetcher;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use futures::future::BoxFuture;
use futures::FutureExt;
use pullsync_types::{RemoteEntry, SyncEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Aggregate result of one folder's children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtreeOutcome {
    pub any_child_failed: bool,
    /// Dispatch stopped early or a child was cancelled
    pub cancelled: bool,
    /// The folder itself was deleted remotely
    pub deleted: bool,
}

impl SubtreeOutcome {
    pub fn is_clean(&self) -> bool {
        !self.any_child_failed && !self.cancelled
    }
}

/// Counters shared by every folder of one scan
#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_downloaded: AtomicU64,
    pub files_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
    pub folders_deleted: AtomicU64,
}

enum ChildReport {
    File(Result<u64, SyncError>),
    Folder(Result<SubtreeOutcome, SyncError>),
}

#[derive(Clone)]
pub struct FolderSynchronizer {
    store: Arc<dyn RemoteStore>,
    fetcher: FileFetcher,
    pool: AdmissionPool,
    event_tx: broadcast::Sender<SyncEvent>,
    stats: Arc<ScanStats>,
}

impl FolderSynchronizer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        fetcher: FileFetcher,
        pool: AdmissionPool,
        event_tx: broadcast::Sender<SyncEvent>,
        stats: Arc<ScanStats>,
    ) -> Self {
        Self {
            store,
            fetcher,
            pool,
            event_tx,
            stats,
        }
    }

    /// Mirror `folder` into `local_dir`, deleting it remotely afterwards
    /// when `delete_after` is set and the whole subtree succeeded
    ///
    /// `token` is held while the folder prepares and lists, and released
    /// before its children are admitted.
    pub fn sync(
        &self,
        folder: RemoteEntry,
        local_dir: PathBuf,
        delete_after: bool,
        token: Option<AdmissionToken>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<SubtreeOutcome, SyncError>> {
        let this = self.clone();
        async move {
            this.sync_folder(&folder, &local_dir, delete_after, token, &cancel)
                .await
        }
        .boxed()
    }

    async fn sync_folder(
        &self,
        folder: &RemoteEntry,
        local_dir: &Path,
        delete_after: bool,
        token: Option<AdmissionToken>,
        cancel: &CancellationToken,
    ) -> Result<SubtreeOutcome, SyncError> {
        ensure_dir(local_dir).await?;

        let children = self
            .store
            .list(folder.id)
            .await
            .map_err(|source| SyncError::Listing {
                name: folder.name.clone(),
                source,
            })?;
        drop(token);

        let mut outcome = SubtreeOutcome::default();
        if children.is_empty() {
            info!("Remote folder '{}' (id {}) empty", folder.name, folder.id);
        } else {
            outcome = self.dispatch_children(children, local_dir, cancel).await;
        }

        if delete_after && outcome.is_clean() {
            self.store
                .delete(folder.id)
                .await
                .map_err(|source| SyncError::RemoteDeletion {
                    name: folder.name.clone(),
                    source,
                })?;
            info!("Successfully deleted remote folder '{}' (id {})", folder.name, folder.id);
            self.stats.folders_deleted.fetch_add(1, Ordering::Relaxed);
            let _ = self.event_tx.send(SyncEvent::FolderDeleted {
                id: folder.id,
                name: folder.name.clone(),
            });
            outcome.deleted = true;
        } else if delete_after {
            debug!(
                "Keeping remote folder '{}' (id {}): {:?}",
                folder.name, folder.id, outcome
            );
        }

        Ok(outcome)
    }

    /// Spawn one admitted task per child and join them all
    async fn dispatch_children(
        &self,
        children: Vec<RemoteEntry>,
        local_dir: &Path,
        cancel: &CancellationToken,
    ) -> SubtreeOutcome {
        let mut outcome = SubtreeOutcome::default();
        let mut tasks = JoinSet::new();

        for child in children {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let token = match self.pool.acquire(cancel).await {
                Ok(token) => token,
                Err(_) => {
                    outcome.cancelled = true;
                    break;
                }
            };

            if child.is_directory {
                let sub_dir = local_dir.join(&child.name);
                let name = child.name.clone();
                let task = self.sync(child, sub_dir, true, Some(token), cancel.clone());
                tasks.spawn(async move { (name, ChildReport::Folder(task.await)) });
            } else {
                let fetcher = self.fetcher.clone();
                let dir = local_dir.to_path_buf();
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    let result = fetcher.fetch(&child, &dir, &cancel).await;
                    token.release();
                    (child.name, ChildReport::File(result))
                });
            }
        }

        if outcome.cancelled {
            info!(
                "Cancelled, not starting remaining items under '{}'",
                local_dir.display()
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, report)) => self.record_child(&name, report, &mut outcome),
                Err(e) => {
                    error!("Task under '{}' panicked: {}", local_dir.display(), e);
                    outcome.any_child_failed = true;
                }
            }
        }

        outcome
    }

    fn record_child(&self, name: &str, report: ChildReport, outcome: &mut SubtreeOutcome) {
        match report {
            ChildReport::File(Ok(bytes)) => {
                self.stats.files_downloaded.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
            }
            ChildReport::File(Err(e)) if e.is_cancelled() => {
                debug!("'{}' not finished: cancelled", name);
                outcome.cancelled = true;
            }
            ChildReport::File(Err(e)) => {
                warn!("Encountered error, but continuing: {}", e);
                self.stats.files_failed.fetch_add(1, Ordering::Relaxed);
                outcome.any_child_failed = true;
            }
            ChildReport::Folder(Ok(child)) => {
                if child.cancelled {
                    outcome.cancelled = true;
                } else if !child.deleted {
                    outcome.any_child_failed = true;
                }
            }
            ChildReport::Folder(Err(e)) if e.is_cancelled() => {
                outcome.cancelled = true;
            }
            ChildReport::Folder(Err(e)) => {
                warn!("Encountered error syncing folder '{}', but continuing: {}", name, e);
                outcome.any_child_failed = true;
            }
        }
    }
}

/// Make sure `dir` exists as a directory, creating it if absent
pub async fn ensure_dir(dir: &Path) -> Result<(), SyncError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::DirectoryConflict(dir.to_path_buf())),
        Err(_) => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| SyncError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            }),
    }
}
