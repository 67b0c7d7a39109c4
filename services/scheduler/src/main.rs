//! workweave scheduler
//!
//! Replays a scenario roster through the assignment engine on a fixed
//! interval and logs a report for every cycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weave_assign::AssignmentEngine;
use weave_scheduler::{
    config::{self, load_engine_config},
    scenario::{ScenarioFile, ScenarioRoster},
    worker::{SchedulerWorker, SchedulerWorkerConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to WEAVE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting workweave scheduler");

    let scenario_path = config
        .scenario_path
        .as_deref()
        .context("WEAVE_SCENARIO must point at a scenario file")?;
    let scenario = ScenarioFile::load(scenario_path)?;

    let base = config
        .engine_config_path
        .as_deref()
        .map(load_engine_config)
        .transpose()?;
    let engine = AssignmentEngine::new(scenario.engine_config(base))
        .context("failed to build assignment engine")?;

    info!(
        scenario = scenario.name.as_deref().unwrap_or("unnamed"),
        workers = scenario.workers.len(),
        categories = engine.registry().len(),
        "Configuration loaded"
    );

    let roster = Arc::new(ScenarioRoster::new(scenario));
    let worker = Arc::new(SchedulerWorker::new(
        engine,
        roster.clone(),
        roster,
        SchedulerWorkerConfig {
            interval: config.cycle_interval,
            ticks_per_cycle: config.ticks_per_cycle,
            max_cycles: config.max_cycles,
        },
    ));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut scheduler_handle = tokio::spawn({
        let worker = worker.clone();
        async move {
            worker.run(shutdown_rx).await;
        }
    });

    // Wait for Ctrl+C or for the worker to hit its cycle limit
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = &mut scheduler_handle => {
            info!("Scheduler worker finished");
        }
    }

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if !scheduler_handle.is_finished() {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, scheduler_handle).await {
            warn!(error = %e, "Scheduler worker did not shut down in time");
        }
    }

    info!(stats = %worker.stats().await, "Scheduler shutdown complete");
    Ok(())
}
