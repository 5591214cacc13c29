//! Configuration file loading
//!
//! ```toml
//! [config]
//! token = "..."
//! maxConcurrency = 2
//! maxKbPerSecond = 0
//! scanInterval = "10m"
//!
//! [[sync]]
//! remote = "movies"
//! local = "/var/downloads"
//! ```

use pullsync_types::{
    parse_duration, Settings, SyncMapping, DEFAULT_MAX_CONCURRENCY, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_SCAN_INTERVAL,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the default config location
pub const CONFIG_ENV: &str = "PULLSYNC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid duration for '{key}': {reason}")]
    Duration { key: &'static str, reason: String },

    #[error("Scan interval must be greater than zero")]
    ZeroScanInterval,

    #[error("Sync entry {0}: local directory cannot be empty")]
    EmptyLocal(usize),

    #[error("Could not determine the config directory; pass --config")]
    NoConfigDir,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    config: GeneralSection,
    #[serde(default)]
    sync: Vec<SyncSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneralSection {
    #[serde(default)]
    token: String,
    max_concurrency: Option<usize>,
    #[serde(default)]
    max_kb_per_second: u64,
    scan_interval: Option<String>,
    progress_interval: Option<String>,
    api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncSection {
    #[serde(default)]
    remote: String,
    #[serde(default)]
    local: String,
}

/// Default config location: `<config dir>/pullsync/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("pullsync").join("config.toml"))
}

/// Read and validate the config file at `path`
pub async fn load(path: &Path) -> Result<Settings, ConfigError> {
    debug!("Loading config from '{}'", path.display());
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    from_str(&contents)
}

/// Parse and validate config text
pub fn from_str(contents: &str) -> Result<Settings, ConfigError> {
    let file: ConfigFile = toml::from_str(contents)?;
    let general = file.config;

    let scan_interval = duration_or(
        "scanInterval",
        general.scan_interval.as_deref(),
        DEFAULT_SCAN_INTERVAL,
    )?;
    if scan_interval.is_zero() {
        return Err(ConfigError::ZeroScanInterval);
    }
    let progress_interval = duration_or(
        "progressInterval",
        general.progress_interval.as_deref(),
        DEFAULT_PROGRESS_INTERVAL,
    )?;

    let mappings = file
        .sync
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            if entry.local.is_empty() {
                return Err(ConfigError::EmptyLocal(i));
            }
            Ok(SyncMapping::new(Some(entry.remote), entry.local))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Settings {
        token: general.token,
        api_url: general.api_url.filter(|url| !url.is_empty()),
        concurrency_limit: general.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        bytes_per_second_limit: general.max_kb_per_second.saturating_mul(1024),
        scan_interval,
        progress_interval,
        mappings,
    })
}

fn duration_or(
    key: &'static str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => parse_duration(raw).map_err(|reason| ConfigError::Duration { key, reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_full_config() {
        let settings = from_str(
            r#"
            [config]
            token = "secret"
            maxConcurrency = 4
            maxKbPerSecond = 512
            scanInterval = "10m"
            progressInterval = "5s"
            apiUrl = "http://localhost:8080"

            [[sync]]
            remote = "movies"
            local = "/var/downloads/movies"

            [[sync]]
            remote = ""
            local = "/var/downloads/all"
            "#,
        )
        .unwrap();

        assert_eq!(settings.token, "secret");
        assert_eq!(settings.concurrency_limit, 4);
        assert_eq!(settings.bytes_per_second_limit, 512 * 1024);
        assert_eq!(settings.scan_interval, Duration::from_secs(600));
        assert_eq!(settings.progress_interval, Duration::from_secs(5));
        assert_eq!(settings.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(settings.mappings.len(), 2);
        assert_eq!(settings.mappings[0].remote_name.as_deref(), Some("movies"));
        assert_eq!(settings.mappings[1].remote_name, None);
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let settings = from_str("[config]\ntoken = \"t\"\n").unwrap();

        assert_eq!(settings.concurrency_limit, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(settings.scan_interval, DEFAULT_SCAN_INTERVAL);
        assert_eq!(settings.progress_interval, DEFAULT_PROGRESS_INTERVAL);
        assert_eq!(settings.bytes_per_second_limit, 0);
        assert!(settings.mappings.is_empty());
    }

    #[test]
    fn explicit_zero_concurrency_is_kept() {
        let settings = from_str("[config]\nmaxConcurrency = 0\n").unwrap();
        assert_eq!(settings.concurrency_limit, 0);
    }

    #[test]
    fn empty_local_is_rejected() {
        let err = from_str(
            r#"
            [[sync]]
            remote = "a"
            local = "/a"

            [[sync]]
            remote = "b"
            local = ""
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::EmptyLocal(1)));
    }

    #[test]
    fn bad_durations_are_rejected() {
        assert!(matches!(
            from_str("[config]\nscanInterval = \"soon\"\n").unwrap_err(),
            ConfigError::Duration { key: "scanInterval", .. }
        ));
        assert!(matches!(
            from_str("[config]\nscanInterval = \"0s\"\n").unwrap_err(),
            ConfigError::ZeroScanInterval
        ));
        let huge = format!("[config]\nscanInterval = \"{}h\"\n", "9".repeat(400));
        assert!(matches!(
            from_str(&huge).unwrap_err(),
            ConfigError::Duration { key: "scanInterval", .. }
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            from_str("[config\ntoken = ").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[sync]]\nremote = \"tv\"\nlocal = \"/tv\"\n").unwrap();

        let settings = load(&path).await.unwrap();
        assert_eq!(settings.mappings[0].local_path, PathBuf::from("/tv"));

        let missing = load(&dir.path().join("nope.toml")).await.unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
