//! Idle detection and temporary priority boosts.
//!
//! Each worker moves through `Working -> Idle -> Boosted` and falls back to
//! `Working` the moment it picks up real work. A boost overrides the worker's
//! assignment for one category with a temporary top-priority one; reverting
//! puts back exactly what was there before (including nothing).

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};
use weave_id::{CategoryKey, Tick, WorkerId};

use crate::category::CategoryRegistry;
use crate::config::IdleConfig;
use crate::demand::DemandTable;
use crate::worker::{Activity, Assignment, Priority, Provenance, Worker};

/// Multiplier for a candidate category nobody is assigned to.
const UNCOVERED_FACTOR: f64 = 5.0;
/// Multiplier for a candidate category that is overloaded.
const OVERLOAD_FACTOR: f64 = 2.0;

/// Per-worker idle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum IdleState {
    #[default]
    Working,
    Idle {
        since: Tick,
    },
    /// Idle with a temporary boost applied to `category`.
    Boosted {
        since: Tick,
        category: CategoryKey,
        /// What the worker held for `category` before the boost.
        original: Option<Assignment>,
    },
}

impl IdleState {
    pub fn is_idle(&self) -> bool {
        !matches!(self, IdleState::Working)
    }

    pub fn boosted_category(&self) -> Option<&CategoryKey> {
        match self {
            IdleState::Boosted { category, .. } => Some(category),
            _ => None,
        }
    }
}

/// What happened to one worker during a monitor pass.
#[derive(Debug, Clone, PartialEq)]
pub enum IdleTransition {
    Unchanged,
    BecameIdle,
    Boosted(CategoryKey),
    /// Past the threshold, but no category qualified.
    NoCandidate,
    Resumed,
    Reverted(CategoryKey),
}

/// Outcome of one monitor pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdleReport {
    pub became_idle: Vec<WorkerId>,
    pub boosted: Vec<(WorkerId, CategoryKey)>,
    pub reverted: Vec<(WorkerId, CategoryKey)>,
    pub resumed: Vec<WorkerId>,
    pub without_candidate: Vec<WorkerId>,
}

/// State counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdleStats {
    pub tracked: usize,
    pub working: usize,
    pub idle: usize,
    pub boosted: usize,
}

impl std::fmt::Display for IdleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "idle monitor: {} tracked, {} working, {} idle, {} boosted",
            self.tracked, self.working, self.idle, self.boosted
        )
    }
}

/// Tracks idle state for every worker in the roster.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    threshold_ticks: u64,
    /// Lowercased task-name fragments that count as idling.
    signatures: Vec<String>,
    overload_threshold: f64,
    states: HashMap<WorkerId, IdleState>,
}

impl IdleMonitor {
    pub fn new(config: &IdleConfig, overload_threshold: f64) -> Self {
        Self {
            threshold_ticks: config.threshold_ticks,
            signatures: config
                .task_signatures
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            overload_threshold,
            states: HashMap::new(),
        }
    }

    /// True if the activity matches an idle signature.
    pub fn is_idle_activity(&self, activity: &Activity) -> bool {
        match activity {
            Activity::NoTask | Activity::Wandering => true,
            Activity::Task(name) => {
                let name = name.to_lowercase();
                self.signatures.iter().any(|sig| name.contains(sig.as_str()))
            }
        }
    }

    pub fn state(&self, worker: WorkerId) -> Option<&IdleState> {
        self.states.get(&worker)
    }

    /// Advance every worker's state machine and apply or revert boosts.
    pub fn monitor_and_redirect(
        &mut self,
        workers: &mut [Worker],
        demand: &DemandTable,
        registry: &CategoryRegistry,
        now: Tick,
    ) -> IdleReport {
        let mut assigned: HashMap<CategoryKey, usize> = HashMap::new();
        for worker in workers.iter() {
            for category in worker.assignments().keys() {
                *assigned.entry(category.clone()).or_default() += 1;
            }
        }

        let mut report = IdleReport::default();
        for worker in workers.iter_mut() {
            let id = worker.id();
            match self.observe(worker, demand, registry, &mut assigned, now) {
                IdleTransition::Unchanged => {}
                IdleTransition::BecameIdle => report.became_idle.push(id),
                IdleTransition::Boosted(category) => report.boosted.push((id, category)),
                IdleTransition::NoCandidate => report.without_candidate.push(id),
                IdleTransition::Resumed => report.resumed.push(id),
                IdleTransition::Reverted(category) => report.reverted.push((id, category)),
            }
        }

        if !report.boosted.is_empty() || !report.reverted.is_empty() {
            info!(
                boosted = report.boosted.len(),
                reverted = report.reverted.len(),
                "Idle boosts updated"
            );
        }
        report
    }

    fn observe(
        &mut self,
        worker: &mut Worker,
        demand: &DemandTable,
        registry: &CategoryRegistry,
        assigned: &mut HashMap<CategoryKey, usize>,
        now: Tick,
    ) -> IdleTransition {
        let idle = self.is_idle_activity(worker.activity());
        let state = self.states.entry(worker.id()).or_default();

        match (std::mem::take(state), idle) {
            (IdleState::Working, false) => IdleTransition::Unchanged,
            (IdleState::Working, true) => {
                *state = IdleState::Idle { since: now };
                IdleTransition::BecameIdle
            }
            (IdleState::Idle { .. }, false) => IdleTransition::Resumed,
            (
                IdleState::Boosted {
                    category, original, ..
                },
                false,
            ) => {
                if !worker.restore_assignment(&category, original) {
                    if let Some(count) = assigned.get_mut(&category) {
                        *count = count.saturating_sub(1);
                    }
                }
                debug!(worker_id = %worker.id(), category = %category, "Reverted idle boost");
                IdleTransition::Reverted(category)
            }
            (IdleState::Idle { since }, true) if now.since(since) > self.threshold_ticks => {
                let candidate =
                    pick_candidate(worker, demand, registry, assigned, self.overload_threshold);
                match candidate {
                    Some(category) => {
                        let original = worker.override_assignment(
                            category.clone(),
                            Assignment::temporary(Priority::MOST_URGENT, Provenance::Idle),
                        );
                        if original.is_none() {
                            *assigned.entry(category.clone()).or_default() += 1;
                        }
                        debug!(
                            worker_id = %worker.id(),
                            category = %category,
                            idle_ticks = now.since(since),
                            "Boosted idle worker"
                        );
                        *state = IdleState::Boosted {
                            since,
                            category: category.clone(),
                            original,
                        };
                        IdleTransition::Boosted(category)
                    }
                    None => {
                        *state = IdleState::Idle { since };
                        IdleTransition::NoCandidate
                    }
                }
            }
            (still_idle, true) => {
                *state = still_idle;
                IdleTransition::Unchanged
            }
        }
    }

    /// Drop state for workers no longer in the roster.
    pub fn retain_roster(&mut self, workers: &[Worker]) -> usize {
        let before = self.states.len();
        let live: std::collections::HashSet<WorkerId> = workers.iter().map(Worker::id).collect();
        self.states.retain(|id, _| live.contains(id));
        before - self.states.len()
    }

    pub fn stats(&self) -> IdleStats {
        self.states.values().fold(
            IdleStats {
                tracked: self.states.len(),
                ..IdleStats::default()
            },
            |mut stats, state| {
                match state {
                    IdleState::Working => stats.working += 1,
                    IdleState::Idle { .. } => stats.idle += 1,
                    IdleState::Boosted { .. } => stats.boosted += 1,
                }
                stats
            },
        )
    }
}

/// Highest-scoring boost target; ties keep registry order.
fn pick_candidate(
    worker: &Worker,
    demand: &DemandTable,
    registry: &CategoryRegistry,
    assigned: &HashMap<CategoryKey, usize>,
    overload_threshold: f64,
) -> Option<CategoryKey> {
    let mut best: Option<(&CategoryKey, f64)> = None;

    for category in registry.schedulable() {
        let key = &category.key;
        if !worker.is_capable(key)
            || worker
                .assignment(key)
                .is_some_and(|a| a.priority.is_most_urgent())
        {
            continue;
        }

        let mut score = demand.raw_demand(key);
        if assigned.get(key).copied().unwrap_or(0) == 0 {
            score *= UNCOVERED_FACTOR;
        }
        if demand
            .get(key)
            .is_some_and(|r| r.normalized_demand > overload_threshold)
        {
            score *= OVERLOAD_FACTOR;
        }

        if score > 0.0 && best.is_none_or(|(_, current)| score > current) {
            best = Some((key, score));
        }
    }

    best.map(|(key, _)| key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;
    use crate::demand::DemandRecord;

    fn key(s: &str) -> CategoryKey {
        CategoryKey::parse(s).unwrap()
    }

    fn registry(keys: &[&str]) -> CategoryRegistry {
        let entries: Vec<_> = keys.iter().map(|k| CategoryConfig::new(key(k))).collect();
        CategoryRegistry::from_config(&entries).unwrap()
    }

    fn record(category: &str, raw: f64, current: usize) -> DemandRecord {
        DemandRecord {
            category: key(category),
            raw_demand: raw,
            capable_workers: 5,
            current_workers: current,
            urgency_multiplier: 1.0,
            normalized_demand: raw / current.max(1) as f64,
            recommended_workers: 1,
        }
    }

    fn monitor() -> IdleMonitor {
        IdleMonitor::new(&IdleConfig::default(), 10.0)
    }

    #[test]
    fn test_idle_signatures() {
        let m = monitor();
        assert!(m.is_idle_activity(&Activity::NoTask));
        assert!(m.is_idle_activity(&Activity::Wandering));
        assert!(m.is_idle_activity(&Activity::Task("Wander_Around".into())));
        assert!(m.is_idle_activity(&Activity::Task("wait_idle".into())));
        assert!(!m.is_idle_activity(&Activity::Task("haul_stone".into())));
    }

    #[test]
    fn test_boost_after_threshold_and_exact_revert() {
        let mut m = monitor();
        let registry = registry(&["hauling", "art"]);
        let demand: DemandTable = [record("hauling", 8.0, 1), record("art", 1.0, 0)]
            .into_iter()
            .collect();
        let original = Assignment::new(Priority::new(3).unwrap(), Provenance::External);
        let mut workers = vec![
            Worker::new(WorkerId::from_u128(1))
                .with_skill(key("hauling"), 1.0)
                .with_skill(key("art"), 1.0),
        ];
        workers[0].assign(key("hauling"), original).unwrap();

        let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(100));
        assert_eq!(report.became_idle.len(), 1);

        // 499 and 500 ticks idle: not yet.
        for now in [599, 600] {
            let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(now));
            assert!(report.boosted.is_empty(), "boosted at {now}");
        }

        let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(601));
        assert_eq!(report.boosted, vec![(WorkerId::from_u128(1), key("hauling"))]);
        let boosted = workers[0].assignment(&key("hauling")).unwrap();
        assert!(boosted.priority.is_most_urgent());
        assert!(boosted.temporary);

        // Boosted exactly once.
        let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(900));
        assert!(report.boosted.is_empty());
        assert_eq!(m.stats().boosted, 1);

        workers[0].set_activity(Activity::Task("haul_stone".into()));
        let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(901));
        assert_eq!(report.reverted, vec![(WorkerId::from_u128(1), key("hauling"))]);
        assert_eq!(workers[0].assignment(&key("hauling")), Some(&original));
        assert_eq!(m.state(WorkerId::from_u128(1)), Some(&IdleState::Working));
    }

    #[test]
    fn test_revert_removes_boost_that_replaced_nothing() {
        let mut m = monitor();
        let registry = registry(&["medical"]);
        let demand: DemandTable = [record("medical", 4.0, 0)].into_iter().collect();
        let mut workers = vec![Worker::new(WorkerId::from_u128(1)).with_skill(key("medical"), 2.0)];

        m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::ZERO);
        m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(501));
        assert!(workers[0].holds(&key("medical")));

        workers[0].set_activity(Activity::Task("surgery".into()));
        m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(502));
        assert!(!workers[0].holds(&key("medical")));
    }

    #[test]
    fn test_uncovered_category_outranks_busier_one() {
        let registry = registry(&["hauling", "art"]);
        // hauling: 10, covered. art: 3 x 5 = 15, uncovered.
        let demand: DemandTable = [record("hauling", 10.0, 2), record("art", 3.0, 0)]
            .into_iter()
            .collect();
        let worker = Worker::new(WorkerId::from_u128(1))
            .with_skill(key("hauling"), 1.0)
            .with_skill(key("art"), 1.0);
        let assigned = HashMap::from([(key("hauling"), 2)]);
        assert_eq!(
            pick_candidate(&worker, &demand, &registry, &assigned, 10.0),
            Some(key("art"))
        );
    }

    #[test]
    fn test_overload_doubles_score() {
        let registry = registry(&["hauling", "art"]);
        // hauling: 24 / 2 = 12 per worker, overloaded -> 48. art: 30 / 3 = 10, not -> 30.
        let demand: DemandTable = [record("hauling", 24.0, 2), record("art", 30.0, 3)]
            .into_iter()
            .collect();
        let worker = Worker::new(WorkerId::from_u128(1))
            .with_skill(key("hauling"), 1.0)
            .with_skill(key("art"), 1.0);
        let assigned = HashMap::from([(key("hauling"), 2), (key("art"), 3)]);
        assert_eq!(
            pick_candidate(&worker, &demand, &registry, &assigned, 10.0),
            Some(key("hauling"))
        );
    }

    #[test]
    fn test_no_candidate_stays_idle() {
        let mut m = monitor();
        let registry = registry(&["art"]);
        let demand: DemandTable = [record("art", 0.0, 0)].into_iter().collect();
        let mut workers = vec![Worker::new(WorkerId::from_u128(1)).with_skill(key("art"), 1.0)];

        m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::ZERO);
        let report = m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::new(1_000));
        assert_eq!(report.without_candidate, vec![WorkerId::from_u128(1)]);
        assert_eq!(
            m.state(WorkerId::from_u128(1)),
            Some(&IdleState::Idle { since: Tick::ZERO })
        );
        assert!(!workers[0].holds(&key("art")));
    }

    #[test]
    fn test_retain_roster_purges_departed() {
        let mut m = monitor();
        let registry = registry(&["art"]);
        let demand = DemandTable::default();
        let mut workers = vec![
            Worker::new(WorkerId::from_u128(1)),
            Worker::new(WorkerId::from_u128(2)),
        ];
        m.monitor_and_redirect(&mut workers, &demand, &registry, Tick::ZERO);
        assert_eq!(m.stats().tracked, 2);

        workers.pop();
        assert_eq!(m.retain_roster(&workers), 1);
        assert!(m.state(WorkerId::from_u128(2)).is_none());
        assert_eq!(m.stats().to_string(), "idle monitor: 1 tracked, 0 working, 1 idle, 0 boosted");
    }
}
