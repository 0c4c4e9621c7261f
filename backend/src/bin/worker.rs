//! Satellite visibility worker.
//!
//! Runs one task to completion, or serves real-time visibility requests
//! until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Serve visibility requests (default task: compute_visibilities)
//! cargo run --bin satvis-worker
//!
//! # Run a single task with key=value arguments
//! cargo run --bin satvis-worker -- generate_tiles radiusInMeter=50000 faces=6
//! cargo run --bin satvis-worker -- celestrack_tle_upload category=stations
//! cargo run --bin satvis-worker -- satellites_tiles_mapping_horizon \
//!     timeStepInSeconds=30 periodInMinutes=90
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)
//! - `SATVIS_*`: configuration overrides, see `satvis_rust::config`

use std::env;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use satvis_rust::app::AppContext;
use satvis_rust::config::AppConfig;
use satvis_rust::tasks::TaskArgs;

const DEFAULT_TASK: &str = "compute_visibilities";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting satellite visibility worker");

    let config = AppConfig::load().context("loading configuration")?;
    let context = AppContext::from_config(config).context("building application context")?;

    let mut cli = env::args().skip(1);
    let (task, args) = match cli.next() {
        Some(task) => (task, parse_args(cli)?),
        None => (
            DEFAULT_TASK.to_string(),
            TaskArgs::from([("defaultHorizon".to_string(), "30".to_string())]),
        ),
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            interrupt.cancel();
        }
    });

    let result = context
        .tasks
        .process(&task, &args, cancel)
        .await
        .with_context(|| format!("task {} failed", task))?;
    info!("Task {} finished: {}", task, result);
    Ok(())
}

fn parse_args(raw: impl Iterator<Item = String>) -> anyhow::Result<TaskArgs> {
    raw.map(|pair| {
        pair.split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .with_context(|| format!("argument {:?} is not key=value", pair))
    })
    .collect()
}
