//! Demand scoring: turns raw zone demand and roster counts into scaling guidance.

use std::collections::BTreeMap;

use serde::Serialize;
use weave_id::CategoryKey;

use crate::category::{Category, CategoryRegistry};
use crate::config::ScoringConfig;
use crate::grid::DemandGrid;
use crate::worker::Worker;

/// Raw demand below which one worker is enough.
const LIGHT_DEMAND: f64 = 5.0;
/// Raw demand below which two workers are recommended.
const MODERATE_DEMAND: f64 = 20.0;
/// Raw demand below which three workers are recommended.
const HEAVY_DEMAND: f64 = 50.0;
/// Raw demand one worker is expected to absorb under heavy load.
const DEMAND_PER_WORKER: f64 = 20.0;

/// Per-category demand for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandRecord {
    pub category: CategoryKey,
    /// Sum of urgency over all zones.
    pub raw_demand: f64,
    pub capable_workers: usize,
    pub current_workers: usize,
    pub urgency_multiplier: f64,
    /// `raw_demand / max(current_workers, 1)`, or zero with no capable workers.
    pub normalized_demand: f64,
    pub recommended_workers: usize,
}

impl DemandRecord {
    /// Demand weighted by category criticality, for cross-category comparisons.
    pub fn weighted_demand(&self) -> f64 {
        self.raw_demand * self.urgency_multiplier
    }

    /// Per-worker pressure weighted by criticality; the match engine's bonus signal.
    pub fn demand_signal(&self) -> f64 {
        self.normalized_demand * self.urgency_multiplier
    }
}

/// Recommended head count for a category.
///
/// Thresholds are on raw demand; the heavy tier is capped by the larger of
/// the capable head count and a third of the pool.
pub fn recommended_workers(raw_demand: f64, capable_workers: usize, pool_size: usize) -> usize {
    if raw_demand <= 0.0 || raw_demand < LIGHT_DEMAND {
        1
    } else if raw_demand < MODERATE_DEMAND {
        capable_workers.min(2)
    } else if raw_demand < HEAVY_DEMAND {
        capable_workers.min(3)
    } else {
        let wanted = (raw_demand / DEMAND_PER_WORKER).ceil() as usize;
        wanted.min(capable_workers.max(pool_size / 3))
    }
}

/// All demand records for a cycle, keyed by category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DemandTable {
    records: BTreeMap<CategoryKey, DemandRecord>,
}

impl DemandTable {
    pub fn get(&self, category: &CategoryKey) -> Option<&DemandRecord> {
        self.records.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DemandRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw demand of a category, zero if unscored.
    pub fn raw_demand(&self, category: &CategoryKey) -> f64 {
        self.get(category).map(|r| r.raw_demand).unwrap_or(0.0)
    }

    /// Sum of raw demand over all records.
    pub fn total_demand(&self) -> f64 {
        self.records.values().map(|r| r.raw_demand).sum()
    }

    /// Records whose normalized demand exceeds `threshold`, hottest first.
    ///
    /// Ties keep key order.
    pub fn hotter_than(&self, threshold: f64) -> Vec<&DemandRecord> {
        let mut hot: Vec<_> = self
            .records
            .values()
            .filter(|r| r.normalized_demand > threshold)
            .collect();
        hot.sort_by(|a, b| b.normalized_demand.total_cmp(&a.normalized_demand));
        hot
    }

    pub(crate) fn insert(&mut self, record: DemandRecord) {
        self.records.insert(record.category.clone(), record);
    }
}

impl FromIterator<DemandRecord> for DemandTable {
    fn from_iter<I: IntoIterator<Item = DemandRecord>>(iter: I) -> Self {
        let mut table = DemandTable::default();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

/// Stateless scorer; a pure function of grid output and a roster snapshot.
#[derive(Debug, Clone)]
pub struct DemandScorer {
    overload_threshold: f64,
}

impl DemandScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            overload_threshold: config.overload_threshold,
        }
    }

    /// Score one category from already-aggregated inputs.
    pub fn score(
        &self,
        category: &Category,
        raw_demand: f64,
        capable_workers: usize,
        current_workers: usize,
        pool_size: usize,
    ) -> DemandRecord {
        let normalized_demand = if capable_workers == 0 {
            0.0
        } else {
            raw_demand.max(0.0) / current_workers.max(1) as f64
        };

        DemandRecord {
            category: category.key.clone(),
            raw_demand,
            capable_workers,
            current_workers,
            urgency_multiplier: category.urgency_multiplier,
            normalized_demand,
            recommended_workers: recommended_workers(raw_demand, capable_workers, pool_size),
        }
    }

    /// Score every visible category against the grid and roster.
    pub fn score_all(
        &self,
        registry: &CategoryRegistry,
        grid: &DemandGrid,
        workers: &[Worker],
    ) -> DemandTable {
        registry
            .visible()
            .map(|category| {
                let (capable, current) = headcount(workers, &category.key);
                self.score(
                    category,
                    grid.demand(&category.key),
                    capable,
                    current,
                    workers.len(),
                )
            })
            .collect()
    }

    /// Strictly more demand per worker than the overload threshold.
    pub fn is_overloaded(&self, record: &DemandRecord) -> bool {
        record.normalized_demand > self.overload_threshold
    }

    /// No demand but more than one worker on it.
    pub fn is_underutilized(&self, record: &DemandRecord) -> bool {
        record.raw_demand == 0.0 && record.current_workers > 1
    }

    pub fn overload_threshold(&self) -> f64 {
        self.overload_threshold
    }
}

/// (capable, currently assigned) worker counts for a category.
pub(crate) fn headcount(workers: &[Worker], category: &CategoryKey) -> (usize, usize) {
    workers.iter().fold((0, 0), |(capable, current), worker| {
        (
            capable + usize::from(worker.is_capable(category)),
            current + usize::from(worker.holds(category)),
        )
    })
}
