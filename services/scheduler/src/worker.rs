//! Scheduler background worker.
//!
//! Runs the assignment cycle on a periodic interval. Each tick of the
//! interval advances the scheduling clock by `ticks_per_cycle`, pulls the
//! roster and the workload, runs one engine cycle and commits the result.
//! A cycle always finishes before the next one starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, instrument};
use weave_assign::{AssignmentEngine, CycleReport, EngineStats};
use weave_id::Tick;

use crate::roster::{Roster, WorkloadSource};

/// Loop settings.
#[derive(Debug, Clone)]
pub struct SchedulerWorkerConfig {
    pub interval: Duration,
    pub ticks_per_cycle: u64,
    pub max_cycles: Option<u64>,
}

impl Default for SchedulerWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ticks_per_cycle: 60,
            max_cycles: None,
        }
    }
}

/// Scheduler worker that drives the assignment engine.
pub struct SchedulerWorker {
    engine: Mutex<AssignmentEngine>,
    roster: Arc<dyn Roster>,
    source: Arc<dyn WorkloadSource>,
    config: SchedulerWorkerConfig,
    clock: AtomicU64,
    cycles: AtomicU64,
}

impl SchedulerWorker {
    pub fn new(
        engine: AssignmentEngine,
        roster: Arc<dyn Roster>,
        source: Arc<dyn WorkloadSource>,
        config: SchedulerWorkerConfig,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            roster,
            source,
            config,
            clock: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
        }
    }

    /// Cycles completed so far, failed ones included.
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> EngineStats {
        self.engine.lock().await.stats()
    }

    /// Run until shutdown is signaled or `max_cycles` is reached.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            ticks_per_cycle = self.config.ticks_per_cycle,
            "Starting scheduler worker"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Scheduling cycle failed");
                    }
                    if self
                        .config
                        .max_cycles
                        .is_some_and(|max| self.cycles_run() >= max)
                    {
                        info!(cycles = self.cycles_run(), "Cycle limit reached");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single cycle at the next clock value.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let tick = Tick::new(
            self.clock
                .fetch_add(self.config.ticks_per_cycle, Ordering::Relaxed)
                + self.config.ticks_per_cycle,
        );
        self.cycles.fetch_add(1, Ordering::Relaxed);

        let mut workers = self.roster.active_workers(tick).await?;
        let observations = self.source.scan(tick).await?;

        let report = {
            let mut engine = self.engine.lock().await;
            let report = engine.run_cycle(&mut workers, &observations, tick);
            let matched = engine.request_assignment(&workers, tick, false);
            info!(
                tick = %tick,
                strategy = %matched.strategy,
                matched = matched.assignments.len(),
                unmatched = matched.unassigned.len(),
                "Global assignment available"
            );
            report
        };

        self.roster.commit(&workers).await?;
        Ok(report)
    }
}
