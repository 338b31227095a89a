//! `freehound` daemon: polls the tracker for free promotions on a fixed
//! interval and pushes alerts for expiring or reneged ones.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use freehound_core::config::AppConfig;
use freehound_core::scheduler;
use freehound_core::service::HunterService;

#[derive(Parser, Debug)]
#[command(name = "freehound", version, about = "Free-promotion watcher for M-Team")]
struct Args {
    /// Path to the config file. Defaults to the per-user config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if !config.has_credential() {
        info!("MT_TOKEN not set; the daemon will idle until configured");
    }

    let service = Arc::new(HunterService::new(config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = tokio::spawn(scheduler::run(service, shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(e) => error!(error = %e, "failed to listen for interrupt"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        error!(error = %e, "scheduler task panicked");
    }
    info!("bye");
}
