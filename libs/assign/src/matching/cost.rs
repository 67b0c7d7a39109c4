//! Pair scoring and the worker x category problem matrix.

use weave_id::{CategoryKey, WorkerId};

use crate::config::MatchConfig;
use crate::demand::{DemandRecord, DemandTable};
use crate::error::AssignResult;
use crate::parallel::{Batch, ParallelExecutor};
use crate::worker::Worker;

/// Scores are inverted against this ceiling to obtain minimization costs.
pub const COST_CEILING: f64 = 1_000.0;

/// Scores a (worker, category) pair.
#[derive(Debug, Clone)]
pub struct CostModel {
    demand_weight: f64,
    stability_bonus: f64,
}

impl CostModel {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            demand_weight: config.demand_weight,
            stability_bonus: config.stability_bonus,
        }
    }

    /// `skill + demand_weight * demand`, with a stability bonus when the worker
    /// already holds the category at top priority. `None` if incapable.
    pub fn score(
        &self,
        worker: &Worker,
        category: &CategoryKey,
        record: Option<&DemandRecord>,
    ) -> Option<f64> {
        if !worker.is_capable(category) {
            return None;
        }

        let demand = record.map(DemandRecord::demand_signal).unwrap_or(0.0);
        let mut score = worker.skill(category) + self.demand_weight * demand;
        if worker
            .assignment(category)
            .is_some_and(|a| a.priority.is_most_urgent())
        {
            score *= 1.0 + self.stability_bonus;
        }
        Some(score)
    }

    /// Minimization cost for a pair; `None` if incapable.
    pub fn cost(
        &self,
        worker: &Worker,
        category: &CategoryKey,
        record: Option<&DemandRecord>,
    ) -> Option<f64> {
        self.score(worker, category, record)
            .map(|score| COST_CEILING - score)
    }
}

/// Scores for every (worker, category) pair of one request.
#[derive(Debug, Clone)]
pub struct MatchProblem {
    workers: Vec<WorkerId>,
    categories: Vec<CategoryKey>,
    /// Row-per-worker scores; `None` marks an incapable pair.
    scores: Vec<Vec<Option<f64>>>,
}

impl MatchProblem {
    /// Build the matrix, one row per worker, rows computed by the executor.
    pub fn build(
        workers: &[Worker],
        categories: Vec<CategoryKey>,
        demand: &DemandTable,
        model: &CostModel,
        executor: &ParallelExecutor,
    ) -> Self {
        let rows: Batch<Vec<Option<f64>>> = executor.map(workers, |worker| -> AssignResult<_> {
            Ok(categories
                .iter()
                .map(|category| model.score(worker, category, demand.get(category)))
                .collect())
        });

        let width = categories.len();
        let scores = rows
            .outputs
            .into_iter()
            .map(|row| row.unwrap_or_else(|| vec![None; width]))
            .collect();

        Self {
            workers: workers.iter().map(Worker::id).collect(),
            categories,
            scores,
        }
    }

    /// Build directly from a score matrix.
    pub fn from_scores(
        workers: Vec<WorkerId>,
        categories: Vec<CategoryKey>,
        scores: Vec<Vec<Option<f64>>>,
    ) -> Self {
        Self {
            workers,
            categories,
            scores,
        }
    }

    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    pub fn categories(&self) -> &[CategoryKey] {
        &self.categories
    }

    pub fn rows(&self) -> usize {
        self.workers.len()
    }

    pub fn cols(&self) -> usize {
        self.categories.len()
    }

    pub fn score(&self, row: usize, col: usize) -> Option<f64> {
        self.scores
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .flatten()
    }

    pub fn cost(&self, row: usize, col: usize) -> Option<f64> {
        self.score(row, col).map(|score| COST_CEILING - score)
    }

    /// True if the worker on this row can take at least one category.
    pub fn is_assignable(&self, row: usize) -> bool {
        (0..self.cols()).any(|col| self.score(row, col).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{Assignment, Priority, Provenance};

    fn key(s: &str) -> CategoryKey {
        CategoryKey::parse(s).unwrap()
    }

    fn record(category: &str, normalized: f64, multiplier: f64) -> DemandRecord {
        DemandRecord {
            category: key(category),
            raw_demand: normalized,
            capable_workers: 1,
            current_workers: 0,
            urgency_multiplier: multiplier,
            normalized_demand: normalized,
            recommended_workers: 1,
        }
    }

    #[test]
    fn test_score_adds_half_the_demand_signal() {
        let model = CostModel::new(&MatchConfig::default());
        let worker = Worker::new(WorkerId::new()).with_skill(key("hauling"), 4.0);
        let rec = record("hauling", 6.0, 1.0);
        assert_eq!(model.score(&worker, &key("hauling"), Some(&rec)), Some(7.0));
        assert_eq!(model.cost(&worker, &key("hauling"), Some(&rec)), Some(993.0));
    }

    #[test]
    fn test_stability_bonus_only_at_top_priority() {
        let model = CostModel::new(&MatchConfig::default());
        let mut worker = Worker::new(WorkerId::new())
            .with_skill(key("hauling"), 10.0)
            .with_skill(key("art"), 10.0);
        worker
            .assign(
                key("hauling"),
                Assignment::new(Priority::MOST_URGENT, Provenance::Coverage),
            )
            .unwrap();
        worker
            .assign(
                key("art"),
                Assignment::new(Priority::new(2).unwrap(), Provenance::Scale),
            )
            .unwrap();

        let hauling = model.score(&worker, &key("hauling"), None).unwrap();
        let art = model.score(&worker, &key("art"), None).unwrap();
        assert!((hauling - 12.0).abs() < 1e-9);
        assert_eq!(art, 10.0);
    }

    #[test]
    fn test_incapable_pair_has_no_score() {
        let model = CostModel::new(&MatchConfig::default());
        let worker = Worker::new(WorkerId::new());
        assert_eq!(model.score(&worker, &key("medical"), None), None);
    }
}
