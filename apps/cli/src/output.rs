//! Rendering helpers shared by the commands

use crate::OutputFormat;
use serde::Serialize;

/// Write `value` to stdout as pretty JSON or through its `Display` impl
pub fn emit<T: Serialize + std::fmt::Display>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

pub fn size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Transfer rate, e.g. `1.5 MiB/s`
pub fn rate(bytes_per_sec: u64) -> String {
    size(bytes_per_sec) + "/s"
}
