//! Sync orchestrator - one scan pass over every configured mapping
//!
//! The top-level coordinator that:
//! - Lists the remote root once per pass
//! - Resolves each mapping to a top-level folder (or the root itself)
//! - Runs the folder synchronizer per mapping without deleting the target
//! - Aggregates counters into a [`ScanReport`]

use crate::engine::admission::AdmissionPool;
use crate::engine::fetcher::FileFetcher;
use crate::engine::folder::{FolderSynchronizer, ScanStats};
use crate::engine::rate_limiter::RateLimiter;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use pullsync_types::{RemoteEntry, ScanReport, Settings, SyncEvent, SyncMapping};
use reqwest::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs scan passes against one remote store
///
/// The admission pool and rate limiter are created once and shared by
/// every pass, so limits hold across overlapping work in a pass.
pub struct Syncer {
    store: Arc<dyn RemoteStore>,
    client: Client,
    pool: AdmissionPool,
    rate_limiter: RateLimiter,
    mappings: Vec<SyncMapping>,
    progress_interval: Duration,
    event_tx: broadcast::Sender<SyncEvent>,
}

enum Resolved {
    Folder(RemoteEntry),
    NotFound,
    NotAFolder,
}

impl Syncer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        client: Client,
        pool: AdmissionPool,
        rate_limiter: RateLimiter,
        mappings: Vec<SyncMapping>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self {
            store,
            client,
            pool,
            rate_limiter,
            mappings,
            progress_interval: pullsync_types::DEFAULT_PROGRESS_INTERVAL,
            event_tx,
        }
    }

    /// Build a syncer with limits and mappings taken from `settings`
    pub fn from_settings(store: Arc<dyn RemoteStore>, settings: &Settings) -> Result<Self, SyncError> {
        // Content downloads can run for hours, so only the connect phase is bounded
        let client = Client::builder()
            .user_agent(concat!("pullsync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Transport {
                name: "http client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::new(
            store,
            client,
            AdmissionPool::new(settings.concurrency_limit),
            RateLimiter::new(settings.bytes_per_second_limit),
            settings.mappings.clone(),
        )
        .with_progress_interval(settings.progress_interval))
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Run one pass over every mapping
    ///
    /// Only a failure to list the remote root is returned as an error.
    /// Everything below that is logged, counted and left for the next pass.
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<ScanReport, SyncError> {
        let _ = self.event_tx.send(SyncEvent::ScanStarted);

        let (root, top_level) =
            self.store
                .list_root()
                .await
                .map_err(|source| SyncError::Listing {
                    name: "<root>".to_string(),
                    source,
                })?;

        let stats = Arc::new(ScanStats::default());
        let fetcher = FileFetcher::new(
            self.store.clone(),
            self.client.clone(),
            self.rate_limiter.clone(),
            self.event_tx.clone(),
            self.progress_interval,
        );
        let folders = FolderSynchronizer::new(
            self.store.clone(),
            fetcher,
            self.pool.clone(),
            self.event_tx.clone(),
            stats.clone(),
        );

        let mut report = ScanReport::default();
        for mapping in &self.mappings {
            if cancel.is_cancelled() {
                info!("Cancelled, skipping remaining mappings");
                report.cancelled = true;
                break;
            }

            let folder = match resolve(mapping, &root, &top_level) {
                Resolved::Folder(folder) => folder,
                Resolved::NotFound => {
                    info!(
                        "Remote folder '{}' not found, skipping",
                        mapping.display_name()
                    );
                    report.mappings_skipped += 1;
                    continue;
                }
                Resolved::NotAFolder => {
                    warn!(
                        "Remote item '{}' is a file, not a folder; skipping",
                        mapping.display_name()
                    );
                    report.mappings_skipped += 1;
                    continue;
                }
            };

            let token = match self.pool.acquire(cancel).await {
                Ok(token) => token,
                Err(_) => {
                    report.cancelled = true;
                    break;
                }
            };

            info!(
                "Syncing remote '{}' to '{}'",
                mapping.display_name(),
                mapping.local_path.display()
            );
            let result = folders
                .sync(
                    folder,
                    mapping.local_path.clone(),
                    false,
                    Some(token),
                    cancel.clone(),
                )
                .await;

            match result {
                Ok(outcome) if outcome.cancelled => {
                    report.cancelled = true;
                    break;
                }
                Ok(outcome) => {
                    if outcome.any_child_failed {
                        warn!(
                            "Some items under '{}' could not be synced, retrying next scan",
                            mapping.display_name()
                        );
                    }
                    report.mappings_synced += 1;
                }
                Err(e) if e.is_cancelled() => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(
                        "Error syncing '{}': {} ({})",
                        mapping.display_name(),
                        e,
                        retry_hint(&e)
                    );
                    report.mappings_failed += 1;
                }
            }
        }

        report.files_downloaded = stats.files_downloaded.load(Ordering::Relaxed);
        report.files_failed = stats.files_failed.load(Ordering::Relaxed);
        report.bytes_downloaded = stats.bytes_downloaded.load(Ordering::Relaxed);
        report.folders_deleted = stats.folders_deleted.load(Ordering::Relaxed);

        info!("Scan finished: {}", report);
        let _ = self.event_tx.send(SyncEvent::ScanCompleted {
            report: report.clone(),
        });
        Ok(report)
    }
}

/// How a failure that aborted a whole mapping should be read by the operator
pub fn retry_hint(error: &SyncError) -> &'static str {
    if error.is_retryable() {
        "will retry next scan"
    } else {
        "will keep failing until fixed locally"
    }
}

fn resolve(mapping: &SyncMapping, root: &RemoteEntry, top_level: &[RemoteEntry]) -> Resolved {
    let Some(name) = mapping.remote_name.as_deref() else {
        return Resolved::Folder(root.clone());
    };
    match top_level.iter().find(|entry| entry.name == name) {
        Some(entry) if entry.is_directory => Resolved::Folder(entry.clone()),
        Some(_) => Resolved::NotAFolder,
        None => Resolved::NotFound,
    }
}
