//! Progress bar utilities for a scan pass

use crate::output::rate;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pullsync_types::{FileStatus, RemoteId, SyncEvent};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError};

/// Manages one progress bar per file in flight
pub struct ScanProgress {
    multi: MultiProgress,
    bars: HashMap<RemoteId, ProgressBar>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    fn add_file(&mut self, id: RemoteId, name: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓▒░  "));
        }
        pb.set_message(name.to_string());
        self.bars.insert(id, pb.clone());
        pb
    }

    /// Update bars from an event; returns `true` once the scan has completed
    pub fn handle_event(&mut self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::FileStatusChanged {
                id,
                name,
                status,
                error,
            } => match status {
                FileStatus::Pending => {
                    self.add_file(*id, name);
                }
                FileStatus::Fetching => {
                    if let Some(pb) = self.bars.get(id) {
                        pb.set_message(name.clone());
                    }
                }
                FileStatus::Verified => {
                    if let Some(pb) = self.bars.get(id) {
                        pb.set_message(format!("{} (verified, removing remote)", name));
                    }
                }
                FileStatus::RemoteDeleted => {
                    if let Some(pb) = self.bars.remove(id) {
                        pb.finish_with_message(format!("{} {}", style("✓").green().bold(), name));
                    }
                }
                FileStatus::Failed => {
                    if let Some(pb) = self.bars.remove(id) {
                        pb.abandon_with_message(format!(
                            "{} {}: {}",
                            style("✗").red().bold(),
                            name,
                            error.as_deref().unwrap_or("unknown error")
                        ));
                    }
                }
            },

            SyncEvent::FileProgress {
                id,
                name,
                downloaded,
                total,
                speed,
            } => {
                if let Some(pb) = self.bars.get(id) {
                    pb.set_length(*total);
                    pb.set_position(*downloaded);
                    pb.set_message(format!("{} @ {}", name, rate(*speed)));
                }
            }

            SyncEvent::FolderDeleted { name, .. } => {
                let _ = self.multi.println(format!(
                    "{} Removed remote folder {}",
                    style("✓").green(),
                    style(name).cyan()
                ));
            }

            SyncEvent::ScanCompleted { .. } => return true,

            SyncEvent::ScanStarted => {}
        }
        false
    }

    /// Clear all progress bars
    pub fn clear(&mut self) {
        for (_, pb) in self.bars.drain() {
            pb.finish_and_clear();
        }
    }
}

/// Drive progress bars until the scan completes or the channel closes
///
/// Returns `true` when the completion event was seen.
pub async fn follow(mut events: broadcast::Receiver<SyncEvent>) -> bool {
    let mut progress = ScanProgress::new();
    let mut completed = false;
    loop {
        match events.recv().await {
            Ok(event) => {
                if progress.handle_event(&event) {
                    completed = true;
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!("Progress display skipped {} events", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
    progress.clear();
    completed
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
