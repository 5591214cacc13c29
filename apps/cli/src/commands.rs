//! CLI command implementations

use crate::output::{emit, rate, size};
use crate::progress;
use crate::OutputFormat;
use anyhow::Result;
use console::style;
use pullsync_core::engine::Syncer;
use pullsync_core::putio::PutioClient;
use pullsync_core::remote::RemoteStore;
use pullsync_core::scheduler::ScanScheduler;
use pullsync_types::{format_duration, ScanReport, Settings};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

fn build_syncer(settings: &Settings) -> Result<Syncer> {
    if settings.token.is_empty() {
        warn!("No API token configured; requests will be rejected");
    }
    if settings.mappings.is_empty() {
        warn!("No [[sync]] entries configured; nothing to do");
    }

    let client = match &settings.api_url {
        Some(base) => PutioClient::with_base_url(base, settings.token.clone())?,
        None => PutioClient::new(settings.token.clone())?,
    };
    let store: Arc<dyn RemoteStore> = Arc::new(client);
    Ok(Syncer::from_settings(store, settings)?)
}

// ============================================================================
// Sync Commands
// ============================================================================

pub async fn run(settings: &Settings, cancel: &CancellationToken) -> Result<()> {
    let syncer = Arc::new(build_syncer(settings)?);
    let passes = ScanScheduler::new(syncer, settings.scan_interval)
        .run(cancel)
        .await;
    println!(
        "{} Stopped after {} scan(s)",
        style("■").dim(),
        style(passes).bold()
    );
    Ok(())
}

pub async fn once(
    settings: &Settings,
    show_progress: bool,
    cancel: &CancellationToken,
    format: OutputFormat,
) -> Result<()> {
    let syncer = build_syncer(settings)?;

    let progress_task =
        show_progress.then(|| tokio::spawn(progress::follow(syncer.subscribe())));

    let result = syncer.scan(cancel).await;
    // Closes the event channel so the progress task drains and exits
    drop(syncer);
    if let Some(task) = progress_task {
        let _ = task.await;
    }
    let report = result?;

    match format {
        OutputFormat::Json => emit(&report, format)?,
        OutputFormat::Table => print_report_table(&report),
        OutputFormat::Human => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &ScanReport) {
    let icon = if report.cancelled {
        style("○").yellow()
    } else if report.files_failed > 0 || report.mappings_failed > 0 {
        style("!").red().bold()
    } else {
        style("✓").green().bold()
    };
    println!("{} Scan finished", icon);
    println!(
        "  Mappings: {} synced, {} skipped, {} failed",
        report.mappings_synced, report.mappings_skipped, report.mappings_failed
    );
    println!(
        "  Files:    {} downloaded ({}), {} failed",
        report.files_downloaded,
        size(report.bytes_downloaded),
        report.files_failed
    );
    println!("  Folders:  {} deleted remotely", report.folders_deleted);
    if report.cancelled {
        println!("  {}", style("Interrupted before completion").yellow());
    }
}

fn print_report_table(report: &ScanReport) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct ReportRow {
        metric: &'static str,
        value: String,
    }

    let rows = vec![
        ReportRow { metric: "mappings synced", value: report.mappings_synced.to_string() },
        ReportRow { metric: "mappings skipped", value: report.mappings_skipped.to_string() },
        ReportRow { metric: "mappings failed", value: report.mappings_failed.to_string() },
        ReportRow { metric: "files downloaded", value: report.files_downloaded.to_string() },
        ReportRow { metric: "files failed", value: report.files_failed.to_string() },
        ReportRow { metric: "bytes downloaded", value: size(report.bytes_downloaded) },
        ReportRow { metric: "folders deleted", value: report.folders_deleted.to_string() },
        ReportRow { metric: "cancelled", value: report.cancelled.to_string() },
    ];
    println!("{}", Table::new(rows));
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Serialize)]
struct ConfigSummary<'a> {
    path: &'a Path,
    #[serde(flatten)]
    settings: &'a Settings,
    token_set: bool,
}

impl fmt::Display for ConfigSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.settings;
        writeln!(f, "{} Config OK: {}", style("✓").green().bold(), self.path.display())?;
        writeln!(
            f,
            "  Token:             {}",
            if self.token_set { "set" } else { "missing" }
        )?;
        if let Some(url) = &s.api_url {
            writeln!(f, "  API URL:           {}", url)?;
        }
        writeln!(
            f,
            "  Max concurrency:   {}",
            if s.concurrency_limit == 0 {
                "unbounded".to_string()
            } else {
                s.concurrency_limit.to_string()
            }
        )?;
        writeln!(
            f,
            "  Speed limit:       {}",
            if s.bytes_per_second_limit == 0 {
                "unlimited".to_string()
            } else {
                rate(s.bytes_per_second_limit)
            }
        )?;
        writeln!(f, "  Scan interval:     {}", format_duration(s.scan_interval))?;
        writeln!(f, "  Progress interval: {}", format_duration(s.progress_interval))?;
        write!(f, "  Mappings:          {}", s.mappings.len())?;
        for mapping in &s.mappings {
            write!(
                f,
                "\n    {} -> {}",
                style(mapping.display_name()).cyan(),
                mapping.local_path.display()
            )?;
        }
        Ok(())
    }
}

pub fn check_config(settings: &Settings, path: &Path, format: OutputFormat) -> Result<()> {
    let summary = ConfigSummary {
        path,
        settings,
        token_set: !settings.token.is_empty(),
    };

    match format {
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct MappingRow {
                remote: String,
                local: String,
            }

            let rows: Vec<MappingRow> = settings
                .mappings
                .iter()
                .map(|m| MappingRow {
                    remote: m.display_name().to_string(),
                    local: m.local_path.display().to_string(),
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        OutputFormat::Human | OutputFormat::Json => emit(&summary, format)?,
    }
    Ok(())
}
