//! cluster-events-sync CLI
//!
//! Runs the sync service or an export pass

use clap::Parser;
use cluster_events_sync::cli::{Cli, Runner};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing in-flight work");
            let _ = shutdown_tx.send(true);
        }
    });

    match Runner::new(cli, shutdown_rx).run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
