//! NRL Nanny station - headless voice relay and beacon daemon.
//!
//! Dials the configured NRL21 server, starts the mixer, schedulers,
//! recorder and live broadcast hub, then runs until a shutdown signal or
//! an unrecoverable socket failure.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nanny_core::Station;
use tokio::signal;

use crate::config::ConfigFile;

/// NRL Nanny - NRL21 voice relay and beacon station.
#[derive(Parser, Debug)]
#[command(name = "nanny-station")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", default_value = "nrlnanny.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "NANNY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Print the parsed configuration and exit.
    #[arg(short = 'o', long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("NRL Nanny station v{}", env!("CARGO_PKG_VERSION"));

    let file = ConfigFile::load(&args.config).context("Failed to load configuration")?;
    let config = file.to_core_config().context("Configuration is invalid")?;

    if args.show_config {
        println!("{:#?}", config);
        return Ok(());
    }

    let station = Station::start(config)
        .await
        .context("Failed to start the station")?;

    tokio::select! {
        _ = shutdown_signal() => log::info!("Shutdown signal received"),
        _ = station.failed() => log::error!("Station failed, shutting down"),
    }

    station.shutdown().await;
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
