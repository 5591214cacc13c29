//! Verified downloader - fetches one remote file into a local directory
//!
//! Content is streamed through the shared rate limiter into a `.partial`
//! sibling, checked against the store's CRC-32 when one is available,
//! renamed into place, and only then deleted remotely.

use crate::engine::rate_limiter::RateLimiter;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use futures::StreamExt;
use pullsync_types::{FileStatus, RemoteEntry, SyncEvent};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Downloads single files for the folder synchronizer
#[derive(Clone)]
pub struct FileFetcher {
    store: Arc<dyn RemoteStore>,
    client: Client,
    rate_limiter: RateLimiter,
    event_tx: broadcast::Sender<SyncEvent>,
    progress_interval: Duration,
}

impl FileFetcher {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        client: Client,
        rate_limiter: RateLimiter,
        event_tx: broadcast::Sender<SyncEvent>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            store,
            client,
            rate_limiter,
            event_tx,
            progress_interval,
        }
    }

    /// Fetch `file` into `local_dir`, verify it and delete it remotely
    ///
    /// Returns the number of bytes written. Any error leaves the remote
    /// file in place for the next scan.
    pub async fn fetch(
        &self,
        file: &RemoteEntry,
        local_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, SyncError> {
        self.emit_status(file, FileStatus::Pending, None);

        let result = self.fetch_and_delete(file, local_dir, cancel).await;
        if let Err(e) = &result {
            self.emit_status(file, FileStatus::Failed, Some(e.to_string()));
        }
        result
    }

    async fn fetch_and_delete(
        &self,
        file: &RemoteEntry,
        local_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, SyncError> {
        let url = self
            .store
            .download_url(file.id)
            .await
            .map_err(|source| SyncError::UrlResolution {
                name: file.name.clone(),
                source,
            })?;

        let expected = file.checksum.as_deref().and_then(|raw| {
            let decoded = decode_crc32(raw);
            if decoded.is_none() {
                warn!(
                    "Error decoding CRC32 '{}' for '{}', downloading without verification",
                    raw, file.name
                );
            }
            decoded
        });

        let target = local_dir.join(&file.name);
        let partial = partial_path(&target);

        info!("Downloading '{}' (id {}) to '{}'", file.name, file.id, local_dir.display());
        self.emit_status(file, FileStatus::Fetching, None);

        let (bytes, actual) = match self.stream_to_file(file, url, &partial, cancel).await {
            Ok(received) => received,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected {
            if expected != actual {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(SyncError::ChecksumMismatch {
                    name: file.name.clone(),
                    expected,
                    actual,
                });
            }
            debug!("Checksum {:08x} verified for '{}'", actual, file.name);
        }

        tokio::fs::rename(&partial, &target).await?;
        info!("Successfully downloaded '{}' (id {})", file.name, file.id);
        self.emit_status(file, FileStatus::Verified, None);

        self.store
            .delete(file.id)
            .await
            .map_err(|source| SyncError::RemoteDeletion {
                name: file.name.clone(),
                source,
            })?;
        info!("Successfully deleted remote file '{}' (id {})", file.name, file.id);
        self.emit_status(file, FileStatus::RemoteDeleted, None);

        Ok(bytes)
    }

    /// Stream the body at `url` into `partial`, returning size and CRC-32
    async fn stream_to_file(
        &self,
        file: &RemoteEntry,
        url: Url,
        partial: &Path,
        cancel: &CancellationToken,
    ) -> Result<(u64, u32), SyncError> {
        let transport = |e: reqwest::Error| SyncError::Transport {
            name: file.name.clone(),
            reason: e.to_string(),
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            response = self.client.get(url).send() => response.map_err(transport)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport {
                name: file.name.clone(),
                reason: format!("server returned {}", status),
            });
        }

        let total = response.content_length().unwrap_or(file.size);
        let downloaded = Arc::new(AtomicU64::new(0));
        let _reporter = self.spawn_progress_reporter(file, total, downloaded.clone());

        let mut out = tokio::fs::File::create(partial).await?;
        let mut hasher = crc32fast::Hasher::new();
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Download of '{}' cancelled", file.name);
                    return Err(SyncError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(transport)?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Download of '{}' cancelled while throttled", file.name);
                    return Err(SyncError::Cancelled);
                }
                _ = self.rate_limiter.acquire(chunk.len() as u64) => {}
            }
            out.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded.fetch_add(chunk.len() as u64, Ordering::AcqRel);
        }

        out.flush().await?;
        out.sync_all().await?;

        Ok((downloaded.load(Ordering::Acquire), hasher.finalize()))
    }

    /// Log and publish progress on every tick until the guard is dropped
    fn spawn_progress_reporter(
        &self,
        file: &RemoteEntry,
        total: u64,
        downloaded: Arc<AtomicU64>,
    ) -> tokio_util::sync::DropGuard {
        let stop = CancellationToken::new();
        let guard = stop.clone().drop_guard();
        let period = self.progress_interval;
        if period.is_zero() {
            return guard;
        }

        let id = file.id;
        let name = file.name.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick completes immediately
            let mut last_downloaded = 0u64;
            let mut last_time = Instant::now();

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let now = Instant::now();
                let done = downloaded.load(Ordering::Acquire);
                let elapsed = now.duration_since(last_time).as_secs_f64();
                let speed = if elapsed > 0.0 {
                    (done.saturating_sub(last_downloaded) as f64 / elapsed) as u64
                } else {
                    0
                };
                let percent = if total > 0 {
                    done as f64 / total as f64 * 100.0
                } else {
                    0.0
                };

                info!(
                    "'{}': {} / {} ({:.2}%) @ {}/s",
                    name,
                    human_bytes::human_bytes(done as f64),
                    human_bytes::human_bytes(total as f64),
                    percent,
                    human_bytes::human_bytes(speed as f64)
                );
                let _ = event_tx.send(SyncEvent::FileProgress {
                    id,
                    name: name.clone(),
                    downloaded: done,
                    total,
                    speed,
                });

                last_downloaded = done;
                last_time = now;
            }
        });

        guard
    }

    fn emit_status(&self, file: &RemoteEntry, status: FileStatus, error: Option<String>) {
        let _ = self.event_tx.send(SyncEvent::FileStatusChanged {
            id: file.id,
            name: file.name.clone(),
            status,
            error,
        });
    }
}

/// Decode a hex CRC-32; anything but exactly four bytes is rejected
pub fn decode_crc32(raw: &str) -> Option<u32> {
    let bytes = hex::decode(raw.trim()).ok()?;
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}
