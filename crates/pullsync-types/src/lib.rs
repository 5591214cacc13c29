//! Shared types for pullsync
//!
//! This crate contains the data structures shared between the sync
//! engine and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Remote Types
// ============================================================================

/// Identifier of a node in the remote store
pub type RemoteId = i64;

/// Id of the remote store root folder
pub const ROOT_ID: RemoteId = 0;

/// Snapshot of one node in the remote hierarchy, taken at listing time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: RemoteId,
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    /// Hex-encoded CRC-32 as reported by the store, if any
    pub checksum: Option<String>,
}

impl RemoteEntry {
    pub fn file(id: RemoteId, name: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            name: name.into(),
            is_directory: false,
            size,
            checksum: None,
        }
    }

    pub fn folder(id: RemoteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_directory: true,
            size: 0,
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// One configured remote-name → local-path pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMapping {
    /// Top-level remote folder name; `None` mirrors the store root
    pub remote_name: Option<String>,
    pub local_path: PathBuf,
}

impl SyncMapping {
    pub fn new(remote_name: Option<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_name: remote_name.filter(|name| !name.is_empty()),
            local_path: local_path.into(),
        }
    }

    /// Name shown in log lines
    pub fn display_name(&self) -> &str {
        self.remote_name.as_deref().unwrap_or("<root>")
    }
}

/// Resolved runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// API token for the remote store
    #[serde(skip_serializing, default)]
    pub token: String,
    /// Base URL of the remote store API
    pub api_url: Option<String>,
    /// Maximum number of concurrently running tasks (0 = unbounded)
    pub concurrency_limit: usize,
    /// Aggregate download ceiling in bytes per second (0 = unlimited)
    pub bytes_per_second_limit: u64,
    #[serde(with = "duration_serde")]
    pub scan_interval: Duration,
    #[serde(with = "duration_serde")]
    pub progress_interval: Duration,
    pub mappings: Vec<SyncMapping>,
}

pub const DEFAULT_MAX_CONCURRENCY: usize = 2;
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: None,
            concurrency_limit: DEFAULT_MAX_CONCURRENCY,
            bytes_per_second_limit: 0,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            mappings: Vec::new(),
        }
    }
}

/// Parse a duration such as `"90s"`, `"10m"` or `"1h30m"`
///
/// Supported units are `ms`, `s`, `m` and `h`. Fractional values are
/// accepted (`"1.5h"`).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{}'", input))?;
        if number_len == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown unit '{}' in duration '{}'", other, input)),
        };
        rest = &rest[unit_len..];
        total += value * seconds_per_unit;
    }

    if !total.is_finite() {
        return Err(format!("duration '{}' is out of range", input));
    }
    Duration::try_from_secs_f64(total)
        .map_err(|_| format!("duration '{}' is out of range", input))
}

/// Render a duration the way `parse_duration` reads it
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms % 1000 != 0 {
        return format!("{}ms", total_ms);
    }

    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Serialization for `Duration` as a human string (`"10m"`)
pub mod duration_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Transfer Types
// ============================================================================

/// Per-file state machine
///
/// `Pending → Fetching → Verified → RemoteDeleted`, or `Failed` from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Fetching,
    Verified,
    RemoteDeleted,
    Failed,
}

/// Counters for one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub mappings_synced: u32,
    pub mappings_skipped: u32,
    pub mappings_failed: u32,
    pub files_downloaded: u64,
    pub files_failed: u64,
    pub bytes_downloaded: u64,
    pub folders_deleted: u64,
    pub cancelled: bool,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mapping(s) synced, {} skipped, {} failed; {} file(s) downloaded ({} bytes), {} failed; {} folder(s) deleted",
            self.mappings_synced,
            self.mappings_skipped,
            self.mappings_failed,
            self.files_downloaded,
            self.bytes_downloaded,
            self.files_failed,
            self.folders_deleted,
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted by the engine for progress displays
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncEvent {
    ScanStarted,
    FileStatusChanged {
        id: RemoteId,
        name: String,
        status: FileStatus,
        error: Option<String>,
    },
    FileProgress {
        id: RemoteId,
        name: String,
        downloaded: u64,
        total: u64,
        speed: u64,
    },
    FolderDeleted {
        id: RemoteId,
        name: String,
    },
    ScanCompleted {
        report: ScanReport,
    },
}
