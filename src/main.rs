//! pgharvest Binary Entry Point
//!
//! This binary runs the complete pgharvest collection daemon.
//! Core functionality is provided by the `pgharvest` library crate.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pgharvest::{Daemon, DryRunSink, LogSink, PostgresDriver, Sink, daemon::spawn_listener};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// pgharvest - Periodic PostgreSQL Statistics Collection
#[derive(Parser, Debug)]
#[command(name = "pgharvest", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "pgharvest.yaml",
        env = "PGHARVEST_CONFIG"
    )]
    config: PathBuf,

    /// Collect once, deliver the results, and exit
    #[arg(short, long)]
    test: bool,

    /// Collect once and print the data that would have been submitted,
    /// without submitting, then exit
    #[arg(long)]
    dry_run: bool,

    /// Output additional debugging information
    #[arg(short, long)]
    verbose: bool,

    /// Write the process id to this path at startup
    #[arg(long)]
    pidfile: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "debug"
    } else {
        "info,sqlx=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("pgharvest - PostgreSQL statistics collection");

    if let Some(ref pidfile) = cli.pidfile {
        std::fs::write(pidfile, std::process::id().to_string())?;
        tracing::debug!(path = %pidfile.display(), "wrote pidfile");
    }

    tracing::info!(config = %cli.config.display(), "loading configuration from file");

    let sink: Arc<dyn Sink> = if cli.dry_run {
        Arc::new(DryRunSink)
    } else {
        Arc::new(LogSink)
    };
    let daemon = Daemon::new(PostgresDriver, sink, &cli.config);

    // One-shot modes validate the configuration, run a single pass, and exit
    if cli.test || cli.dry_run {
        daemon.run_once().await?;
        return Ok(());
    }

    let control = spawn_listener()?;
    tracing::info!("scheduling started, send SIGHUP to reload or SIGTERM to stop");

    daemon.run(control).await;

    tracing::info!("exiting");
    Ok(())
}
