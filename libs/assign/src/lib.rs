//! Demand-driven worker assignment.
//!
//! This crate continuously assigns a pool of heterogeneous workers to task
//! categories:
//!
//! - [`DemandGrid`] aggregates workload observations into per-zone, per-category urgency.
//! - [`DemandScorer`] turns that into per-category [`DemandRecord`]s.
//! - [`CoverageAllocator`] runs the three allocation phases (coverage, scaling, redirection).
//! - [`IdleMonitor`] boosts long-idle workers toward under-served categories and reverts exactly.
//! - [`MatchEngine`] computes a cached global mapping with an optimal or greedy solver.
//! - [`ParallelExecutor`] fans per-worker work out over scoped threads for large pools.
//!
//! [`AssignmentEngine`] owns all of these and runs a full cycle. The crate
//! is synchronous and does no I/O; the caller supplies the roster, the
//! observations and the clock.
//!
//! ## Example
//!
//! ```
//! use weave_assign::{AssignmentEngine, EngineConfig, Observation, Position, Worker};
//! use weave_id::{CategoryKey, Tick, WorkerId};
//!
//! let hauling = CategoryKey::parse("hauling").unwrap();
//! let mut engine = AssignmentEngine::new(EngineConfig::with_categories([hauling.clone()])).unwrap();
//!
//! let mut workers = vec![Worker::new(WorkerId::new()).with_skill(hauling.clone(), 3.0)];
//! let observations = vec![Observation::new(Position::new(10, 20), hauling.clone(), 4.0)];
//!
//! let report = engine.run_cycle(&mut workers, &observations, Tick::new(1));
//! assert_eq!(report.coverage.changes.len(), 1);
//! assert!(workers[0].holds(&hauling));
//! ```

pub mod category;
pub mod config;
pub mod coverage;
pub mod demand;
pub mod engine;
pub mod error;
pub mod grid;
pub mod idle;
pub mod matching;
pub mod parallel;
pub mod worker;

pub use category::{Category, CategoryRegistry};
pub use config::{
    AllocationConfig, CategoryConfig, EngineConfig, GridConfig, IdleConfig, MatchConfig,
    ParallelConfig, ScoringConfig,
};
pub use coverage::{AssignmentChange, CoverageAllocator, CoverageOutcome, RedirectOutcome};
pub use demand::{DemandRecord, DemandScorer, DemandTable};
pub use engine::{AssignmentEngine, CycleReport, EngineStats, RedirectReport};
pub use error::{AssignError, AssignResult};
pub use grid::{DemandGrid, GridStats, Observation, Position, Zone, ZoneCoord};
pub use idle::{IdleMonitor, IdleReport, IdleState, IdleStats};
pub use matching::{CacheEntry, MatchEngine, MatchStrategy, StrategyKind};
pub use parallel::{Batch, ExecutionMode, ParallelExecutor, TaskFailure};
pub use worker::{Activity, Assignment, Priority, Provenance, Worker};
