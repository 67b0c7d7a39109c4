//! Three-phase allocation: coverage, demand scaling, idle redirection.
//!
//! The allocator holds no state between cycles. Each phase only adds
//! assignments; a category or worker it cannot serve is reported and the
//! phase moves on.

use serde::Serialize;
use tracing::{debug, instrument, warn};
use weave_id::{CategoryKey, WorkerId};

use crate::category::CategoryRegistry;
use crate::config::AllocationConfig;
use crate::demand::{DemandRecord, DemandTable};
use crate::error::AssignResult;
use crate::parallel::{ParallelExecutor, TaskFailure};
use crate::worker::{Assignment, Priority, Provenance, Worker};

/// One assignment added by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentChange {
    pub worker: WorkerId,
    pub category: CategoryKey,
    pub priority: Priority,
    pub provenance: Provenance,
}

/// Result of the coverage phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageOutcome {
    pub changes: Vec<AssignmentChange>,
    /// Schedulable categories no worker can take.
    pub uncovered: Vec<CategoryKey>,
}

/// Result of the redirection phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedirectOutcome {
    pub changes: Vec<AssignmentChange>,
    /// Under-assigned workers with no hot category they can take.
    pub without_target: Vec<WorkerId>,
    pub failures: Vec<TaskFailure>,
}

/// Stateless three-phase allocator.
#[derive(Debug, Clone)]
pub struct CoverageAllocator {
    fairness_penalty: f64,
    under_assigned_ratio: f64,
    redirect_demand_threshold: f64,
    coverage_priority: Priority,
    scale_priority: Priority,
    idle_priority: Priority,
}

impl CoverageAllocator {
    pub fn new(config: &AllocationConfig) -> AssignResult<Self> {
        Ok(Self {
            fairness_penalty: config.fairness_penalty,
            under_assigned_ratio: config.under_assigned_ratio,
            redirect_demand_threshold: config.redirect_demand_threshold,
            coverage_priority: Priority::new(config.coverage_priority)?,
            scale_priority: Priority::new(config.scale_priority)?,
            idle_priority: Priority::new(config.idle_priority)?,
        })
    }

    /// Skill minus a penalty per category the worker already holds.
    pub fn fairness_score(&self, worker: &Worker, category: &CategoryKey) -> f64 {
        worker.skill(category) - self.fairness_penalty * worker.assignment_count() as f64
    }

    /// Phase 1: give every schedulable category at least one worker.
    ///
    /// Categories that already have a holder are left alone, so running this
    /// twice in a cycle changes nothing.
    #[instrument(skip_all, fields(pool = workers.len()))]
    pub fn ensure_coverage(
        &self,
        workers: &mut [Worker],
        registry: &CategoryRegistry,
    ) -> CoverageOutcome {
        self.cover(workers, registry.schedulable().map(|c| &c.key))
    }

    /// Phase 1 restricted to `categories`, for gaps opened after the coverage
    /// phase already ran (a reverted idle boost).
    ///
    /// Categories that are not schedulable are ignored.
    pub fn restore_coverage(
        &self,
        workers: &mut [Worker],
        registry: &CategoryRegistry,
        categories: &[CategoryKey],
    ) -> CoverageOutcome {
        self.cover(
            workers,
            registry
                .schedulable()
                .map(|c| &c.key)
                .filter(|key| categories.contains(key)),
        )
    }

    fn cover<'a>(
        &self,
        workers: &mut [Worker],
        categories: impl Iterator<Item = &'a CategoryKey>,
    ) -> CoverageOutcome {
        let mut outcome = CoverageOutcome::default();

        for key in categories {
            if workers.iter().any(|w| w.holds(key)) {
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (i, worker) in workers.iter().enumerate() {
                if !worker.is_capable(key) {
                    continue;
                }
                let score = self.fairness_score(worker, key);
                if best.is_none_or(|(_, current)| score > current) {
                    best = Some((i, score));
                }
            }

            let Some((i, _)) = best else {
                warn!(category = %key, "No capable worker, category left uncovered");
                outcome.uncovered.push(key.clone());
                continue;
            };
            if let Some(change) = apply(
                &mut workers[i],
                key,
                self.coverage_priority,
                Provenance::Coverage,
            ) {
                outcome.changes.push(change);
            }
        }

        debug!(
            assigned = outcome.changes.len(),
            uncovered = outcome.uncovered.len(),
            "Coverage phase complete"
        );
        outcome
    }

    /// Target head count for a category's share of total demand.
    pub fn target_workers(demand: f64, total_demand: f64, pool_size: usize) -> usize {
        if total_demand <= 0.0 {
            return 1;
        }
        ((demand / total_demand * pool_size as f64).ceil() as usize).max(1)
    }

    /// Phase 2: add workers to categories in proportion to their demand.
    ///
    /// Categories are handled in descending weighted demand; candidates are
    /// capable workers that do not yet hold the category, best score first.
    #[instrument(skip_all, fields(pool = workers.len()))]
    pub fn scale_by_demand(
        &self,
        workers: &mut [Worker],
        registry: &CategoryRegistry,
        demand: &DemandTable,
    ) -> Vec<AssignmentChange> {
        let mut records: Vec<&DemandRecord> = registry
            .schedulable()
            .filter_map(|c| demand.get(&c.key))
            .filter(|r| r.raw_demand > 0.0)
            .collect();
        let total: f64 = records.iter().map(|r| r.raw_demand).sum();
        records.sort_by(|a, b| rank(b.weighted_demand()).total_cmp(&rank(a.weighted_demand())));

        let pool_size = workers.len();
        let mut changes = Vec::new();
        for record in records {
            let key = &record.category;
            let target = Self::target_workers(record.raw_demand, total, pool_size);
            let current = workers.iter().filter(|w| w.holds(key)).count();
            if current >= target {
                continue;
            }
            let deficit = target - current;

            let mut candidates: Vec<(usize, f64)> = workers
                .iter()
                .enumerate()
                .filter(|(_, w)| w.is_capable(key) && !w.holds(key))
                .map(|(i, w)| (i, self.fairness_score(w, key)))
                .collect();
            candidates.sort_by(|a, b| rank(b.1).total_cmp(&rank(a.1)));

            let before = changes.len();
            for (i, _) in candidates.into_iter().take(deficit) {
                if let Some(change) =
                    apply(&mut workers[i], key, self.scale_priority, Provenance::Scale)
                {
                    changes.push(change);
                }
            }
            debug!(
                category = %key,
                target,
                current,
                added = changes.len() - before,
                "Scaled category"
            );
        }
        changes
    }

    /// Phase 3: send each under-assigned worker to the hottest category it can take.
    ///
    /// Runs per worker through the executor; one category per worker per cycle.
    #[instrument(skip_all, fields(pool = workers.len()))]
    pub fn redirect_under_assigned(
        &self,
        workers: &mut [Worker],
        registry: &CategoryRegistry,
        demand: &DemandTable,
        executor: &ParallelExecutor,
    ) -> RedirectOutcome {
        let floor = self.under_assigned_ratio * registry.visible_count() as f64;
        let hot: Vec<&DemandRecord> = demand
            .hotter_than(self.redirect_demand_threshold)
            .into_iter()
            .filter(|r| registry.get(&r.category).is_some_and(|c| c.is_schedulable()))
            .collect();

        let batch = executor.for_each_mut(workers, |worker| -> AssignResult<Redirect> {
            if (worker.assignment_count() as f64) >= floor {
                return Ok(Redirect::NotNeeded);
            }
            let target = hot
                .iter()
                .find(|r| worker.is_capable(&r.category) && !worker.holds(&r.category));
            let Some(record) = target else {
                return Ok(Redirect::NoTarget(worker.id()));
            };
            worker.assign(
                record.category.clone(),
                Assignment::new(self.idle_priority, Provenance::Idle),
            )?;
            Ok(Redirect::Assigned(AssignmentChange {
                worker: worker.id(),
                category: record.category.clone(),
                priority: self.idle_priority,
                provenance: Provenance::Idle,
            }))
        });

        let mut outcome = RedirectOutcome {
            failures: batch.failures,
            ..RedirectOutcome::default()
        };
        for redirect in batch.outputs.into_iter().flatten() {
            match redirect {
                Redirect::NotNeeded => {}
                Redirect::NoTarget(worker) => outcome.without_target.push(worker),
                Redirect::Assigned(change) => outcome.changes.push(change),
            }
        }

        debug!(
            redirected = outcome.changes.len(),
            without_target = outcome.without_target.len(),
            mode = ?batch.mode,
            "Redirection phase complete"
        );
        outcome
    }
}

enum Redirect {
    NotNeeded,
    NoTarget(WorkerId),
    Assigned(AssignmentChange),
}

/// Sort key for descending orders: NaN ranks below every number.
fn rank(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

fn apply(
    worker: &mut Worker,
    category: &CategoryKey,
    priority: Priority,
    provenance: Provenance,
) -> Option<AssignmentChange> {
    match worker.assign(category.clone(), Assignment::new(priority, provenance)) {
        Ok(()) => Some(AssignmentChange {
            worker: worker.id(),
            category: category.clone(),
            priority,
            provenance,
        }),
        Err(error) => {
            warn!(worker_id = %worker.id(), category = %category, %error, "Assignment rejected");
            None
        }
    }
}
