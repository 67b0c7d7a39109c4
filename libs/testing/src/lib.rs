//! Test fixtures shared by the workweave crates.
//!
//! Worker ids are built from small integers so fixtures are deterministic
//! and sort in creation order.

use weave_assign::{
    Activity, CategoryConfig, CategoryRegistry, EngineConfig, Observation, Position, Worker,
};
use weave_id::{CategoryKey, WorkerId};

/// Parse a category key, panicking on invalid input.
pub fn key(s: &str) -> CategoryKey {
    CategoryKey::parse(s).unwrap_or_else(|e| panic!("bad fixture key {s:?}: {e}"))
}

/// Deterministic worker id `n`.
pub fn worker_id(n: u128) -> WorkerId {
    WorkerId::from_u128(n)
}

/// A busy worker with no skills.
pub fn worker(n: u128) -> Worker {
    Worker::new(worker_id(n)).with_activity(Activity::Task("working".to_string()))
}

/// A busy worker with the given skills.
pub fn skilled_worker(n: u128, skills: &[(&str, f64)]) -> Worker {
    skills
        .iter()
        .fold(worker(n), |w, (category, skill)| w.with_skill(key(category), *skill))
}

/// `size` busy workers, each capable of every category with the same skill.
pub fn all_capable_pool(size: usize, categories: &[&str], skill: f64) -> Vec<Worker> {
    (1..=size as u128)
        .map(|n| {
            categories
                .iter()
                .fold(worker(n), |w, category| w.with_skill(key(category), skill))
        })
        .collect()
}

/// Default engine config over the given visible categories.
pub fn config(categories: &[&str]) -> EngineConfig {
    EngineConfig::with_categories(categories.iter().map(|c| key(c)))
}

/// Registry over the given visible categories.
pub fn registry(categories: &[&str]) -> CategoryRegistry {
    let entries: Vec<_> = categories
        .iter()
        .map(|c| CategoryConfig::new(key(c)))
        .collect();
    CategoryRegistry::from_config(&entries).unwrap_or_else(|e| panic!("bad fixture registry: {e}"))
}

/// One observation per unit of `total` urgency, spread along the x axis from `origin`.
///
/// Handy for producing an exact raw demand that spans several zones.
pub fn observations_at(origin: Position, category: &str, total: u32) -> Vec<Observation> {
    (0..total as i32)
        .map(|i| {
            Observation::new(
                Position::new(origin.x + i * 3, origin.z),
                key(category),
                1.0,
            )
        })
        .collect()
}
