//! Edu Daemon - background task worker
//!
//! Renders issued certificates and sends learner notifications from the
//! task outbox.

use anyhow::{Context, Result};
use clap::Parser;
use edu_common::logging::init_tracing;
use edu_common::store::SqliteStore;
use edu_common::EduConfig;
use edud::Worker;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "edud")]
#[command(about = "EduAI background worker", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (default: /etc/eduai/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Process one batch and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = EduConfig::load(args.config.as_deref())?;

    init_tracing(&config.logging.filter);
    info!("Edu Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let db_path = config.database.path.clone();
    let timeout = Duration::from_millis(config.database.effective_busy_timeout_ms());
    let store = tokio::task::spawn_blocking(move || SqliteStore::open(&db_path, timeout))
        .await
        .context("Database open task panicked")??;

    let worker = Worker::new(store, &config.worker);

    if args.once {
        let report = worker.run_once().await?;
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    info!("Edu Daemon ready");
    worker
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("Shutting down gracefully");

    Ok(())
}
