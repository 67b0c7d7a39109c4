//! The assignment engine context.
//!
//! One `AssignmentEngine` owns every component and runs a scheduling cycle
//! end to end: scan, score, cover, scale, redirect. Callers own the roster
//! and the clock and pass both in.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};
use weave_id::{CategoryKey, Tick};

use crate::category::CategoryRegistry;
use crate::config::EngineConfig;
use crate::coverage::{AssignmentChange, CoverageAllocator, CoverageOutcome, RedirectOutcome};
use crate::demand::{DemandRecord, DemandScorer, DemandTable};
use crate::error::AssignResult;
use crate::grid::{DemandGrid, GridStats, Observation, Zone};
use crate::idle::{IdleMonitor, IdleReport, IdleStats};
use crate::matching::{CacheEntry, CacheStatsSnapshot, MatchEngine};
use crate::parallel::ParallelExecutor;
use crate::worker::Worker;

/// Outcome of the redirection phase: under-assigned redirects plus idle boosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedirectReport {
    pub redirect: RedirectOutcome,
    pub idle: IdleReport,
    /// Coverage re-established for categories a reverted boost left without a holder.
    pub recovered: CoverageOutcome,
}

/// Summary of one scheduling cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub tick: Tick,
    pub pool_size: usize,
    /// Last cycle's engine-owned assignments cleared at the start of this one.
    pub released: usize,
    pub grid: GridStats,
    /// Observations naming a category that is not registered.
    pub unregistered: usize,
    pub demand: Vec<DemandRecord>,
    pub coverage: CoverageOutcome,
    pub scaled: Vec<AssignmentChange>,
    pub redirect: RedirectReport,
    pub purged_workers: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    /// Assignments added across all phases, boosts included.
    pub fn assignments_added(&self) -> usize {
        self.coverage.changes.len()
            + self.scaled.len()
            + self.redirect.redirect.changes.len()
            + self.redirect.idle.boosted.len()
            + self.redirect.recovered.changes.len()
    }
}

/// Engine-wide statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineStats {
    pub cycles: u64,
    pub last_tick: Option<Tick>,
    pub grid: GridStats,
    pub cache: CacheStatsSnapshot,
    pub idle: IdleStats,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.last_tick {
            Some(tick) => writeln!(f, "engine: {} cycles, last at tick {}", self.cycles, tick)?,
            None => writeln!(f, "engine: no cycles run")?,
        }
        writeln!(f, "{}", self.grid)?;
        writeln!(f, "{}", self.cache)?;
        write!(f, "{}", self.idle)
    }
}

/// Explicitly constructed engine context; one per scheduler.
#[derive(Debug)]
pub struct AssignmentEngine {
    config: EngineConfig,
    registry: CategoryRegistry,
    grid: DemandGrid,
    scorer: DemandScorer,
    allocator: CoverageAllocator,
    matcher: MatchEngine,
    idle: IdleMonitor,
    executor: ParallelExecutor,
    demand: DemandTable,
    cycles: u64,
    last_tick: Option<Tick>,
}

impl AssignmentEngine {
    /// Validate the config and build every component.
    pub fn new(config: EngineConfig) -> AssignResult<Self> {
        config.validate()?;
        let registry = CategoryRegistry::from_config(&config.categories)?;

        Ok(Self {
            grid: DemandGrid::new(&config.grid)?,
            scorer: DemandScorer::new(&config.scoring),
            allocator: CoverageAllocator::new(&config.allocation)?,
            matcher: MatchEngine::new(&config.matching),
            idle: IdleMonitor::new(&config.idle, config.scoring.overload_threshold),
            executor: ParallelExecutor::new(&config.parallel),
            demand: DemandTable::default(),
            cycles: 0,
            last_tick: None,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &ParallelExecutor {
        &self.executor
    }

    pub fn idle_monitor(&self) -> &IdleMonitor {
        &self.idle
    }

    /// Run one full cycle against the live roster.
    #[instrument(skip_all, fields(cycle = self.cycles + 1, tick = %now, pool = workers.len()))]
    pub fn run_cycle(
        &mut self,
        workers: &mut [Worker],
        observations: &[Observation],
        now: Tick,
    ) -> CycleReport {
        let started = Instant::now();
        self.cycles += 1;
        self.last_tick = Some(now);

        let purged_workers = self.idle.retain_roster(workers);
        let released: usize = workers
            .iter_mut()
            .map(Worker::release_engine_assignments)
            .sum();

        let unregistered = self.scan(observations);
        self.refresh_demand(workers);

        let coverage = self.ensure_coverage(workers);
        let scaled = self.scale_by_demand(workers);
        let redirect = self.monitor_and_redirect(workers, now);
        self.matcher.purge_expired(now);

        let report = CycleReport {
            cycle: self.cycles,
            tick: now,
            pool_size: workers.len(),
            released,
            grid: self.grid.stats(),
            unregistered,
            demand: self.demand.iter().cloned().collect(),
            coverage,
            scaled,
            redirect,
            purged_workers,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            added = report.assignments_added(),
            uncovered = report.coverage.uncovered.len() + report.redirect.recovered.uncovered.len(),
            boosted = report.redirect.idle.boosted.len(),
            reverted = report.redirect.idle.reverted.len(),
            failures = report.redirect.redirect.failures.len(),
            duration_ms = report.duration_ms,
            "Scheduling cycle complete"
        );
        report
    }

    /// Rebuild the grid from this cycle's observations.
    ///
    /// Returns how many observations named an unregistered category; those
    /// are dropped like observations without a category.
    pub fn scan(&mut self, observations: &[Observation]) -> usize {
        self.grid.reset();
        let mut unregistered = 0;
        for observation in observations {
            match &observation.category {
                Some(category) if !self.registry.contains(category) => {
                    debug!(category = %category, "Dropping observation for unregistered category");
                    unregistered += 1;
                }
                _ => {
                    self.grid.add_observation(observation);
                }
            }
        }
        unregistered
    }

    /// Recompute demand records from the current grid and roster.
    pub fn refresh_demand(&mut self, workers: &[Worker]) -> &DemandTable {
        self.demand = self.scorer.score_all(&self.registry, &self.grid, workers);
        &self.demand
    }

    /// Phase 1 against the registry.
    pub fn ensure_coverage(&self, workers: &mut [Worker]) -> CoverageOutcome {
        self.allocator.ensure_coverage(workers, &self.registry)
    }

    /// Phase 2 against the current demand records.
    pub fn scale_by_demand(&self, workers: &mut [Worker]) -> Vec<AssignmentChange> {
        self.allocator
            .scale_by_demand(workers, &self.registry, &self.demand)
    }

    /// Phase 3: redirect under-assigned workers, then advance idle state.
    pub fn monitor_and_redirect(&mut self, workers: &mut [Worker], now: Tick) -> RedirectReport {
        let redirect = self.allocator.redirect_under_assigned(
            workers,
            &self.registry,
            &self.demand,
            &self.executor,
        );
        let idle = self
            .idle
            .monitor_and_redirect(workers, &self.demand, &self.registry, now);

        // A boost that replaced nothing is removed on revert, which can leave
        // its category with no holder after the coverage phase already ran.
        let reverted: Vec<CategoryKey> = idle.reverted.iter().map(|(_, c)| c.clone()).collect();
        let recovered = if reverted.is_empty() {
            CoverageOutcome::default()
        } else {
            self.allocator
                .restore_coverage(workers, &self.registry, &reverted)
        };
        RedirectReport {
            redirect,
            idle,
            recovered,
        }
    }

    /// Global worker to category mapping, cached by worker-set fingerprint.
    pub fn request_assignment(
        &self,
        workers: &[Worker],
        now: Tick,
        force_recalculate: bool,
    ) -> Arc<CacheEntry> {
        self.matcher.request(
            workers,
            &self.registry,
            &self.demand,
            &self.executor,
            now,
            force_recalculate,
        )
    }

    /// Raw demand for a category from the last scan.
    pub fn demand(&self, category: &CategoryKey) -> f64 {
        self.grid.demand(category)
    }

    pub fn active_categories(&self) -> BTreeSet<CategoryKey> {
        self.grid.active_categories()
    }

    pub fn active_zones(&self) -> Vec<&Zone> {
        self.grid.active_zones()
    }

    pub fn demand_table(&self) -> &DemandTable {
        &self.demand
    }

    pub fn is_overloaded(&self, record: &DemandRecord) -> bool {
        self.scorer.is_overloaded(record)
    }

    pub fn is_underutilized(&self, record: &DemandRecord) -> bool {
        self.scorer.is_underutilized(record)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cycles: self.cycles,
            last_tick: self.last_tick,
            grid: self.grid.stats(),
            cache: self.matcher.cache_stats(),
            idle: self.idle.stats(),
        }
    }
}
