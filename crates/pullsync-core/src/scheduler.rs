//! Scan Scheduler - runs a scan pass once per interval
//!
//! Errors from a pass are logged and the loop carries on; the next pass
//! starts from a fresh remote listing.

use crate::engine::{retry_hint, Syncer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic driver for a [`Syncer`]
pub struct ScanScheduler {
    syncer: Arc<Syncer>,
    interval: Duration,
}

impl ScanScheduler {
    pub fn new(syncer: Arc<Syncer>, interval: Duration) -> Self {
        Self { syncer, interval }
    }

    /// Scan until `cancel` fires, returning the number of completed passes
    pub async fn run(&self, cancel: &CancellationToken) -> u64 {
        info!(
            "Starting scan scheduler, interval {}",
            pullsync_types::format_duration(self.interval)
        );
        let mut passes = 0;

        loop {
            info!("Scanning remote files");
            match self.syncer.scan(cancel).await {
                Ok(report) if report.cancelled => {}
                Ok(_) => passes += 1,
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("Scan failed: {} ({})", e, retry_hint(&e));
                    passes += 1;
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            info!(
                "Next scan in {}",
                pullsync_types::format_duration(self.interval)
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Scan scheduler stopped");
        passes
    }
}
