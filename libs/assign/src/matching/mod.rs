//! Global worker to category matching.
//!
//! Small pools are solved exactly, large pools with a single greedy pass.
//! The two strategies are not guaranteed to agree across the switch point.
//! Results are cached per worker-set fingerprint for a fixed number of ticks.

mod cache;
mod cost;
mod greedy;
mod optimal;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};
use weave_id::{CategoryKey, Tick};

pub use cache::{AssignmentCache, CacheEntry, CacheStats, CacheStatsSnapshot, Fingerprint};
pub use cost::{CostModel, MatchProblem, COST_CEILING};
pub use greedy::GreedyMatcher;
pub use optimal::OptimalMatcher;

use crate::category::CategoryRegistry;
use crate::config::MatchConfig;
use crate::demand::DemandTable;
use crate::parallel::ParallelExecutor;
use crate::worker::Worker;

/// Which solver produced a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Optimal,
    Greedy,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Optimal => f.write_str("optimal"),
            StrategyKind::Greedy => f.write_str("greedy"),
        }
    }
}

/// A matching strategy.
///
/// `solve` returns one entry per problem row: the chosen column, or `None`
/// for a worker that was left out. Every row gets at most one column.
pub trait MatchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn solve(&self, problem: &MatchProblem) -> Vec<Option<usize>>;
}

/// Strategy selection, scoring and caching.
#[derive(Debug)]
pub struct MatchEngine {
    model: CostModel,
    optimal: OptimalMatcher,
    greedy: GreedyMatcher,
    optimal_pool_threshold: usize,
    cache: AssignmentCache,
}

impl MatchEngine {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            model: CostModel::new(config),
            optimal: OptimalMatcher::new(config.crowding_penalty),
            greedy: GreedyMatcher::new(config.unclaimed_bonus),
            optimal_pool_threshold: config.optimal_pool_threshold,
            cache: AssignmentCache::new(config.cache_ttl_ticks),
        }
    }

    /// Strategy for a pool of the given size.
    pub fn strategy_for(&self, pool_size: usize) -> &dyn MatchStrategy {
        if pool_size < self.optimal_pool_threshold {
            &self.optimal
        } else {
            &self.greedy
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.model
    }

    /// Full mapping for a worker set, served from cache unless `force` is set
    /// or the cached entry has expired.
    #[instrument(skip_all, fields(pool = workers.len(), force))]
    pub fn request(
        &self,
        workers: &[Worker],
        registry: &CategoryRegistry,
        demand: &DemandTable,
        executor: &ParallelExecutor,
        now: Tick,
        force: bool,
    ) -> Arc<CacheEntry> {
        let fingerprint = Fingerprint::of(workers);
        if !force {
            if let Some(entry) = self.cache.lookup(&fingerprint, now) {
                debug!(computed_at = %entry.computed_at, "Serving cached assignment");
                return entry;
            }
        }

        let entry = Arc::new(self.compute(fingerprint, workers, registry, demand, executor, now));
        self.cache.insert(Arc::clone(&entry));
        entry
    }

    fn compute(
        &self,
        fingerprint: Fingerprint,
        workers: &[Worker],
        registry: &CategoryRegistry,
        demand: &DemandTable,
        executor: &ParallelExecutor,
        now: Tick,
    ) -> CacheEntry {
        let categories: Vec<CategoryKey> =
            registry.schedulable().map(|c| c.key.clone()).collect();
        let problem = MatchProblem::build(workers, categories, demand, &self.model, executor);
        let strategy = self.strategy_for(workers.len());
        let solution = strategy.solve(&problem);

        let mut assignments = BTreeMap::new();
        let mut unassigned = Vec::new();
        let mut total_score = 0.0;
        for (row, choice) in solution.into_iter().enumerate() {
            let worker = problem.workers()[row];
            match choice.and_then(|col| Some((col, problem.score(row, col)?))) {
                Some((col, score)) => {
                    total_score += score;
                    assignments.insert(worker, problem.categories()[col].clone());
                }
                None => unassigned.push(worker),
            }
        }

        for worker in &unassigned {
            debug!(worker_id = %worker, "Worker has no capable category");
        }
        info!(
            strategy = %strategy.kind(),
            assigned = assignments.len(),
            unassigned = unassigned.len(),
            total_score,
            "Computed assignment"
        );

        CacheEntry {
            fingerprint,
            assignments,
            unassigned,
            total_score,
            strategy: strategy.kind(),
            computed_at: now,
        }
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self, now: Tick) -> usize {
        self.cache.purge_expired(now)
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryConfig, ParallelConfig};
    use rstest::rstest;
    use weave_id::WorkerId;

    fn key(s: &str) -> CategoryKey {
        CategoryKey::parse(s).unwrap()
    }

    fn registry(keys: &[&str]) -> CategoryRegistry {
        let entries: Vec<_> = keys.iter().map(|k| CategoryConfig::new(key(k))).collect();
        CategoryRegistry::from_config(&entries).unwrap()
    }

    fn pool(n: u128, keys: &[&str]) -> Vec<Worker> {
        (1..=n)
            .map(|i| {
                keys.iter().fold(Worker::new(WorkerId::from_u128(i)), |w, k| {
                    w.with_skill(key(k), (i % 7) as f64)
                })
            })
            .collect()
    }

    fn executor() -> ParallelExecutor {
        ParallelExecutor::new(&ParallelConfig::default())
    }

    #[rstest]
    #[case(1, StrategyKind::Optimal)]
    #[case(49, StrategyKind::Optimal)]
    #[case(50, StrategyKind::Greedy)]
    #[case(300, StrategyKind::Greedy)]
    fn test_strategy_switch_point(#[case] pool_size: usize, #[case] expected: StrategyKind) {
        let engine = MatchEngine::new(&MatchConfig::default());
        assert_eq!(engine.strategy_for(pool_size).kind(), expected);
    }

    #[rstest]
    #[case(49)]
    #[case(50)]
    fn test_every_capable_worker_gets_one_category(#[case] size: u128) {
        let engine = MatchEngine::new(&MatchConfig::default());
        let registry = registry(&["a", "b", "c"]);
        let mut workers = pool(size, &["a", "b", "c"]);
        workers.push(Worker::new(WorkerId::from_u128(10_000)));

        let entry = engine.request(
            &workers,
            &registry,
            &DemandTable::default(),
            &executor(),
            Tick::ZERO,
            true,
        );
        assert_eq!(entry.assignments.len(), size as usize);
        assert_eq!(entry.unassigned, vec![WorkerId::from_u128(10_000)]);
        for category in ["a", "b", "c"] {
            assert!(entry.assignments.values().any(|c| c.as_str() == category));
        }
    }

    #[test]
    fn test_cached_until_ttl_then_recomputed() {
        let config = MatchConfig {
            cache_ttl_ticks: 100,
            ..MatchConfig::default()
        };
        let engine = MatchEngine::new(&config);
        let registry = registry(&["a", "b"]);
        let workers = pool(4, &["a", "b"]);
        let exec = executor();
        let demand = DemandTable::default();

        let first = engine.request(&workers, &registry, &demand, &exec, Tick::new(10), false);
        let again = engine.request(&workers, &registry, &demand, &exec, Tick::new(110), false);
        assert!(Arc::ptr_eq(&first, &again));

        let fresh = engine.request(&workers, &registry, &demand, &exec, Tick::new(111), false);
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.computed_at, Tick::new(111));
        assert_eq!(first.assignments, fresh.assignments);
    }

    #[test]
    fn test_force_bypasses_cache() {
        let engine = MatchEngine::new(&MatchConfig::default());
        let registry = registry(&["a"]);
        let workers = pool(3, &["a"]);
        let exec = executor();
        let demand = DemandTable::default();

        let first = engine.request(&workers, &registry, &demand, &exec, Tick::new(1), false);
        let forced = engine.request(&workers, &registry, &demand, &exec, Tick::new(2), true);
        assert!(!Arc::ptr_eq(&first, &forced));
        assert_eq!(engine.cache_stats().hits, 0);
    }

    #[test]
    fn test_always_enabled_categories_not_matched() {
        let engine = MatchEngine::new(&MatchConfig::default());
        let mut mining = CategoryConfig::new(key("mining"));
        mining.always_enabled = true;
        let registry =
            CategoryRegistry::from_config(&[mining, CategoryConfig::new(key("art"))]).unwrap();
        let workers = pool(2, &["mining", "art"]);

        let entry = engine.request(
            &workers,
            &registry,
            &DemandTable::default(),
            &executor(),
            Tick::ZERO,
            false,
        );
        assert!(entry.assignments.values().all(|c| c.as_str() == "art"));
    }
}
