//! Engine configuration.
//!
//! Every section deserializes with defaults, so a config file only needs to
//! mention the knobs it changes. Call [`EngineConfig::validate`] (or build an
//! engine, which does it for you) before use.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use weave_id::CategoryKey;

use crate::error::{AssignError, AssignResult};
use crate::worker::Priority;

/// Default zone edge length, in domain units.
pub const DEFAULT_ZONE_SIZE: u32 = 16;

/// Default domain extent along each axis.
pub const DEFAULT_DOMAIN_EXTENT: u32 = 250;

/// Upper bound on the number of preallocated zones.
pub const MAX_ZONES: u64 = 1 << 20;

/// Default idle duration before a boost is considered.
pub const DEFAULT_IDLE_THRESHOLD_TICKS: u64 = 500;

/// Default lifetime of a cached assignment.
pub const DEFAULT_CACHE_TTL_TICKS: u64 = 2_500;

/// Pool size at which the matcher switches from optimal to greedy.
pub const DEFAULT_OPTIMAL_POOL_THRESHOLD: usize = 50;

/// Pool size at which per-worker work fans out to threads.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 50;

/// Workers per parallel chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub scoring: ScoringConfig,
    pub allocation: AllocationConfig,
    pub matching: MatchConfig,
    pub idle: IdleConfig,
    pub parallel: ParallelConfig,
    /// Registered categories, in scheduling order.
    pub categories: Vec<CategoryConfig>,
}

/// Spatial grid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Zone edge length.
    pub zone_size: u32,
    /// Domain width (x axis); positions at or beyond it are dropped.
    pub domain_width: u32,
    /// Domain height (z axis); positions at or beyond it are dropped.
    pub domain_height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            zone_size: DEFAULT_ZONE_SIZE,
            domain_width: DEFAULT_DOMAIN_EXTENT,
            domain_height: DEFAULT_DOMAIN_EXTENT,
        }
    }
}

impl GridConfig {
    /// Zones needed to tile the domain, or `None` for a zero zone size.
    pub fn zone_count(&self) -> Option<u64> {
        if self.zone_size == 0 {
            return None;
        }
        let cols = u64::from(self.domain_width.div_ceil(self.zone_size));
        let rows = u64::from(self.domain_height.div_ceil(self.zone_size));
        Some(cols * rows)
    }

    /// Positions are `i32`, so every extent must fit one; the zone table is
    /// preallocated, so its size is capped.
    pub fn validate(&self) -> AssignResult<()> {
        let Some(zones) = self.zone_count() else {
            return Err(invalid("grid.zone_size must be positive"));
        };
        for (name, value) in [
            ("zone_size", self.zone_size),
            ("domain_width", self.domain_width),
            ("domain_height", self.domain_height),
        ] {
            if i32::try_from(value).is_err() {
                return Err(invalid(format!("grid.{name} must not exceed {}", i32::MAX)));
            }
        }
        if zones > MAX_ZONES {
            return Err(invalid(format!(
                "grid would need {zones} zones, more than the limit of {MAX_ZONES}"
            )));
        }
        Ok(())
    }
}

/// Demand scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Normalized demand above which a category counts as overloaded.
    pub overload_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 10.0,
        }
    }
}

/// Three-phase allocator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Score penalty per category a worker already holds.
    pub fairness_penalty: f64,
    /// Workers holding fewer than this share of visible categories are redirected.
    pub under_assigned_ratio: f64,
    /// Normalized demand a category needs before idle workers are sent to it.
    pub redirect_demand_threshold: f64,
    pub coverage_priority: u8,
    pub scale_priority: u8,
    pub idle_priority: u8,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            fairness_penalty: 5.0,
            under_assigned_ratio: 0.3,
            redirect_demand_threshold: 5.0,
            coverage_priority: 1,
            scale_priority: 2,
            idle_priority: 3,
        }
    }
}

/// Match engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Pools smaller than this use the optimal solver.
    pub optimal_pool_threshold: usize,
    /// Ticks a cached result stays valid.
    pub cache_ttl_ticks: u64,
    /// Weight of the demand signal in a pair score.
    pub demand_weight: f64,
    /// Fractional bonus for a category the worker already holds at top priority.
    pub stability_bonus: f64,
    /// Greedy bonus for a category nobody has claimed yet.
    pub unclaimed_bonus: f64,
    /// Optimal-solver cost added per extra worker placed in the same category.
    pub crowding_penalty: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            optimal_pool_threshold: DEFAULT_OPTIMAL_POOL_THRESHOLD,
            cache_ttl_ticks: DEFAULT_CACHE_TTL_TICKS,
            demand_weight: 0.5,
            stability_bonus: 0.2,
            unclaimed_bonus: 100.0,
            crowding_penalty: 5.0,
        }
    }
}

/// Idle monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Idle ticks that must be exceeded before a boost.
    pub threshold_ticks: u64,
    /// Task names (case-insensitive substrings) that count as idling.
    pub task_signatures: Vec<String>,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold_ticks: DEFAULT_IDLE_THRESHOLD_TICKS,
            task_signatures: vec!["wander".to_string(), "wait_idle".to_string()],
        }
    }
}

/// Parallel execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Pools at least this large run in parallel.
    pub threshold: usize,
    pub chunk_size: usize,
    /// Upper bound on scoped threads per batch.
    pub max_parallelism: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PARALLEL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// One registered category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub key: CategoryKey,
    /// Invisible categories never take part in scheduling.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Overrides the built-in multiplier for this key.
    #[serde(default)]
    pub urgency_multiplier: Option<f64>,
    /// Enabled for everyone by policy; exempt from all three phases.
    #[serde(default)]
    pub always_enabled: bool,
}

fn default_visible() -> bool {
    true
}

impl CategoryConfig {
    /// A visible category with the built-in multiplier.
    pub fn new(key: CategoryKey) -> Self {
        Self {
            key,
            visible: true,
            urgency_multiplier: None,
            always_enabled: false,
        }
    }
}

impl EngineConfig {
    /// Config with the given categories and default knobs.
    pub fn with_categories(categories: impl IntoIterator<Item = CategoryKey>) -> Self {
        Self {
            categories: categories.into_iter().map(CategoryConfig::new).collect(),
            ..Self::default()
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> AssignResult<()> {
        self.grid.validate()?;
        if self.parallel.chunk_size == 0 {
            return Err(invalid("parallel.chunk_size must be positive"));
        }
        if self.parallel.max_parallelism == 0 {
            return Err(invalid("parallel.max_parallelism must be positive"));
        }
        let ratio = self.allocation.under_assigned_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(invalid("allocation.under_assigned_ratio must be in (0, 1]"));
        }
        for level in [
            self.allocation.coverage_priority,
            self.allocation.scale_priority,
            self.allocation.idle_priority,
        ] {
            Priority::new(level)?;
        }
        if self.matching.stability_bonus < 0.0 {
            return Err(invalid("matching.stability_bonus must not be negative"));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if !seen.insert(&category.key) {
                return Err(invalid(format!("duplicate category '{}'", category.key)));
            }
            if let Some(multiplier) = category.urgency_multiplier {
                if !(multiplier.is_finite() && multiplier > 0.0) {
                    return Err(invalid(format!(
                        "category '{}' has a non-positive urgency multiplier",
                        category.key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AssignError {
    AssignError::InvalidConfig(message.into())
}
