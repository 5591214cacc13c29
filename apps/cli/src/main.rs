//! pullsync CLI - mirror a remote file store and clean it up
//!
//! Downloads every file under the configured remote folders, verifies it
//! and deletes the remote copy, then prunes the emptied remote folders.

mod commands;
mod output;
mod progress;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// pullsync - pull-and-delete sync for put.io
#[derive(Parser)]
#[command(name = "pullsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "PULLSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    output: OutputFormat,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan periodically until interrupted
    Run,

    /// Run a single scan pass
    Once {
        /// Show progress bars for active transfers
        #[arg(short, long)]
        progress: bool,
    },

    /// Load and validate the config file
    CheckConfig,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "pullsync=info,pullsync_core=info",
        1 => "pullsync=debug,pullsync_core=debug",
        _ => "pullsync=trace,pullsync_core=trace",
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::builder().parse(directives)?,
        _ => EnvFilter::builder().parse(default_level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// Cancel `cancel` on the first SIGINT or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
        info!("Shutdown signal received, finishing up");
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        use clap::CommandFactory;
        clap_complete::generate(shell, &mut Cli::command(), "pullsync", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.verbose)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => pullsync_core::config::default_config_path()?,
    };
    let settings = pullsync_core::config::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;

    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Run => {
            spawn_signal_handler(cancel.clone());
            commands::run(&settings, &cancel).await?
        }

        Commands::Once { progress } => {
            spawn_signal_handler(cancel.clone());
            commands::once(&settings, progress, &cancel, cli.output).await?
        }

        Commands::CheckConfig => commands::check_config(&settings, &config_path, cli.output)?,

        Commands::Completions { .. } => {}
    }

    Ok(())
}
