//! Full-cycle scenarios driven through `AssignmentEngine`.

use std::sync::Arc;

use proptest::prelude::*;
use weave_assign::{
    Activity, AssignmentEngine, CoverageAllocator, EngineConfig, Observation, Position, Priority,
    Provenance, StrategyKind, Worker,
};
use weave_id::Tick;
use weave_testing::{all_capable_pool, config, key, observations_at, registry, skilled_worker};

fn holders(workers: &[Worker], category: &str) -> usize {
    let category = key(category);
    workers.iter().filter(|w| w.holds(&category)).count()
}

fn abc_observations() -> Vec<Observation> {
    let mut observations = observations_at(Position::new(0, 0), "a", 50);
    observations.extend(observations_at(Position::new(0, 100), "b", 5));
    observations
}

#[test]
fn test_demand_drives_allocation() {
    let mut engine = AssignmentEngine::new(config(&["a", "b", "c"])).unwrap();
    let mut workers = all_capable_pool(10, &["a", "b", "c"], 5.0);

    let report = engine.run_cycle(&mut workers, &abc_observations(), Tick::new(1));

    assert_eq!(engine.demand(&key("a")), 50.0);
    assert_eq!(engine.demand(&key("b")), 5.0);
    assert_eq!(engine.demand(&key("c")), 0.0);
    assert!(report.coverage.uncovered.is_empty());

    // C has no demand: coverage only.
    assert_eq!(holders(&workers, "c"), 1);
    let a = holders(&workers, "a");
    assert!(a > holders(&workers, "b"));
    assert!(a > holders(&workers, "c"));
    assert!(report.scaled.iter().all(|c| c.category == key("a")));

    // Anything redirected in phase 3 went to the hottest category.
    assert!(report
        .redirect
        .redirect
        .changes
        .iter()
        .all(|c| c.category == key("a")));
}

#[test]
fn test_unassigned_workers_redirected_to_hottest_category() {
    let mut engine = AssignmentEngine::new(config(&["a", "b", "c"])).unwrap();
    let mut workers = all_capable_pool(10, &["a", "b", "c"], 5.0);

    engine.scan(&abc_observations());
    engine.refresh_demand(&workers);
    let coverage = engine.ensure_coverage(&mut workers);
    assert_eq!(coverage.changes.len(), 3);

    let report = engine.monitor_and_redirect(&mut workers, Tick::new(1));
    assert_eq!(report.redirect.changes.len(), 7);
    assert!(report
        .redirect
        .changes
        .iter()
        .all(|c| c.category == key("a") && c.provenance == Provenance::Idle));
    assert!(workers.iter().all(|w| w.assignment_count() >= 1));
}

#[test]
fn test_idle_boost_threshold_and_revert() {
    let mut engine = AssignmentEngine::new(config(&["a", "b", "c"])).unwrap();
    let mut workers = vec![
        skilled_worker(1, &[("a", 20.0), ("b", 20.0), ("c", 20.0)]),
        skilled_worker(2, &[("c", 1.0)]).with_activity(Activity::NoTask),
    ];
    let observations = observations_at(Position::new(0, 0), "c", 30);
    let idler = workers[1].id();

    engine.run_cycle(&mut workers, &observations, Tick::new(0));
    for now in [499, 500] {
        let report = engine.run_cycle(&mut workers, &observations, Tick::new(now));
        assert!(report.redirect.idle.boosted.is_empty(), "boosted at {now}");
    }

    let report = engine.run_cycle(&mut workers, &observations, Tick::new(501));
    assert_eq!(report.redirect.idle.boosted, vec![(idler, key("c"))]);
    let boosted = *workers[1].assignment(&key("c")).unwrap();
    assert!(boosted.temporary);
    assert!(boosted.priority.is_most_urgent());

    let again = engine.run_cycle(&mut workers, &observations, Tick::new(510));
    assert!(again.redirect.idle.boosted.is_empty());
    assert_eq!(engine.stats().idle.boosted, 1);

    workers[1].set_activity(Activity::Task("sow_field".to_string()));
    let report = engine.run_cycle(&mut workers, &observations, Tick::new(511));
    assert_eq!(report.redirect.idle.reverted, vec![(idler, key("c"))]);
    let restored = workers[1].assignment(&key("c")).unwrap();
    assert_eq!(restored.provenance, Provenance::Scale);
    assert_eq!(restored.priority, Priority::new(2).unwrap());
    assert!(!restored.temporary);
}

#[test]
fn test_reverted_boost_keeps_category_covered() {
    let mut engine = AssignmentEngine::new(config(&["a", "c"])).unwrap();
    let mut workers = vec![
        skilled_worker(1, &[("a", 10.0), ("c", 10.0)]),
        skilled_worker(2, &[("c", 1.0)]).with_activity(Activity::NoTask),
    ];
    let mut observations = observations_at(Position::new(0, 0), "a", 50);
    observations.extend(observations_at(Position::new(0, 100), "c", 3));
    let idler = workers[1].id();

    engine.run_cycle(&mut workers, &observations, Tick::new(0));
    let report = engine.run_cycle(&mut workers, &observations, Tick::new(501));
    assert_eq!(report.redirect.idle.boosted, vec![(idler, key("c"))]);

    // The boost is now the only hold on "c"; coverage leaves it alone.
    engine.run_cycle(&mut workers, &observations, Tick::new(510));
    assert_eq!(holders(&workers, "c"), 1);
    assert!(workers[1].assignment(&key("c")).unwrap().temporary);

    workers[1].set_activity(Activity::Task("sow_field".to_string()));
    let report = engine.run_cycle(&mut workers, &observations, Tick::new(520));
    assert_eq!(report.redirect.idle.reverted, vec![(idler, key("c"))]);
    assert!(!workers[1].holds(&key("c")));
    assert_eq!(holders(&workers, "c"), 1);
    assert!(workers[0].holds(&key("c")));
    assert_eq!(report.redirect.recovered.changes.len(), 1);
    assert_eq!(report.redirect.recovered.changes[0].provenance, Provenance::Coverage);
    assert!(report.redirect.recovered.uncovered.is_empty());
}

#[test]
fn test_departed_workers_are_purged() {
    let mut engine = AssignmentEngine::new(config(&["a"])).unwrap();
    let mut workers = all_capable_pool(3, &["a"], 1.0);
    for worker in &mut workers {
        worker.set_activity(Activity::Wandering);
    }

    engine.run_cycle(&mut workers, &[], Tick::new(1));
    assert_eq!(engine.stats().idle.tracked, 3);

    workers.truncate(1);
    let report = engine.run_cycle(&mut workers, &[], Tick::new(2));
    assert_eq!(report.purged_workers, 2);
    assert_eq!(engine.stats().idle.tracked, 1);
}

#[test]
fn test_strategy_boundary_through_engine() {
    let engine = AssignmentEngine::new(config(&["a", "b", "c"])).unwrap();

    let small = all_capable_pool(49, &["a", "b", "c"], 2.0);
    let entry = engine.request_assignment(&small, Tick::ZERO, true);
    assert_eq!(entry.strategy, StrategyKind::Optimal);
    assert_eq!(entry.assignments.len(), 49);

    let large = all_capable_pool(50, &["a", "b", "c"], 2.0);
    let entry = engine.request_assignment(&large, Tick::ZERO, true);
    assert_eq!(entry.strategy, StrategyKind::Greedy);
    assert_eq!(entry.assignments.len(), 50);
}

#[test]
fn test_cached_assignment_lifetime() {
    let engine = AssignmentEngine::new(config(&["a", "b"])).unwrap();
    let workers = all_capable_pool(6, &["a", "b"], 1.0);
    let ttl = engine.config().matching.cache_ttl_ticks;

    let first = engine.request_assignment(&workers, Tick::new(100), false);
    let same = engine.request_assignment(&workers, Tick::new(100 + ttl), false);
    assert!(Arc::ptr_eq(&first, &same));

    let recomputed = engine.request_assignment(&workers, Tick::new(100 + ttl + 1), false);
    assert!(!Arc::ptr_eq(&first, &recomputed));
    assert_eq!(recomputed.computed_at, Tick::new(100 + ttl + 1));

    let stats = engine.stats().cache;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.evictions, 1);
}

fn varied_pool(size: u128) -> Vec<Worker> {
    let categories = ["a", "b", "c", "d", "e"];
    (1..=size)
        .map(|n| {
            let skills: Vec<(&str, f64)> = categories
                .iter()
                .enumerate()
                .filter(|(i, _)| (n as usize + i) % 3 != 0)
                .map(|(i, c)| (*c, ((n as usize * 7 + i * 13) % 11) as f64))
                .collect();
            let worker = skilled_worker(n, &skills);
            if n % 4 == 0 {
                worker.with_activity(Activity::NoTask)
            } else {
                worker
            }
        })
        .collect()
}

#[test]
fn test_parallel_and_sequential_cycles_agree() {
    let categories = ["a", "b", "c", "d", "e"];
    let mut sequential_config = config(&categories);
    sequential_config.parallel.threshold = usize::MAX;
    let mut parallel_config: EngineConfig = config(&categories);
    parallel_config.parallel.threshold = 1;
    parallel_config.parallel.chunk_size = 7;
    parallel_config.parallel.max_parallelism = 4;

    let mut observations = observations_at(Position::new(0, 0), "a", 40);
    observations.extend(observations_at(Position::new(0, 60), "c", 25));
    observations.extend(observations_at(Position::new(0, 120), "e", 12));

    let mut sequential = AssignmentEngine::new(sequential_config).unwrap();
    let mut parallel = AssignmentEngine::new(parallel_config).unwrap();
    let mut seq_workers = varied_pool(120);
    let mut par_workers = varied_pool(120);

    for tick in [1, 2, 600] {
        sequential.run_cycle(&mut seq_workers, &observations, Tick::new(tick));
        parallel.run_cycle(&mut par_workers, &observations, Tick::new(tick));
        assert_eq!(seq_workers, par_workers, "diverged at tick {tick}");
    }

    let seq_entry = sequential.request_assignment(&seq_workers, Tick::new(600), true);
    let par_entry = parallel.request_assignment(&par_workers, Tick::new(600), true);
    assert_eq!(seq_entry.assignments, par_entry.assignments);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_coverage_reaches_every_viable_category(
        capabilities in proptest::collection::vec(
            proptest::collection::vec((0usize..4, 0.0f64..10.0), 0..4),
            1..12,
        )
    ) {
        let categories = ["a", "b", "c", "d"];
        let mut workers: Vec<Worker> = capabilities
            .iter()
            .enumerate()
            .map(|(n, skills)| {
                let skills: Vec<(&str, f64)> =
                    skills.iter().map(|(c, s)| (categories[*c], *s)).collect();
                skilled_worker(n as u128 + 1, &skills)
            })
            .collect();

        let allocator = CoverageAllocator::new(&EngineConfig::default().allocation).unwrap();
        let registry = registry(&categories);
        let outcome = allocator.ensure_coverage(&mut workers, &registry);

        for category in categories {
            let k = key(category);
            let viable = workers.iter().any(|w| w.is_capable(&k));
            let covered = workers.iter().any(|w| w.holds(&k));
            prop_assert_eq!(viable, covered, "category {}", category);
            prop_assert_eq!(!viable, outcome.uncovered.contains(&k));
        }
    }
}
