//! Spatial demand grid.
//!
//! The domain is cut into fixed-size square zones. Each scan cycle the grid
//! is reset and refilled from workload observations, so per-cycle work is
//! proportional to the zones that actually saw work instead of the whole
//! domain. Zones are preallocated once and reused across cycles.
//!
//! This is a best-effort aggregator: observations outside the domain or
//! without a category are dropped, never reported as errors.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use weave_id::CategoryKey;

use crate::config::GridConfig;
use crate::error::{AssignError, AssignResult};

/// A point in the operating domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Integer zone coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneCoord {
    pub x: i32,
    pub z: i32,
}

impl std::fmt::Display for ZoneCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// One unit of observed work emitted by a workload scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub position: Position,
    /// Work the scanner could not classify carries no category.
    #[serde(default)]
    pub category: Option<CategoryKey>,
    pub urgency: f64,
}

impl Observation {
    pub fn new(position: Position, category: CategoryKey, urgency: f64) -> Self {
        Self {
            position,
            category: Some(category),
            urgency,
        }
    }
}

/// A grid cell and its per-cycle accumulators.
#[derive(Debug, Clone)]
pub struct Zone {
    coord: ZoneCoord,
    urgency: HashMap<CategoryKey, f64>,
    active: BTreeSet<CategoryKey>,
    observations: u32,
}

impl Zone {
    fn new(coord: ZoneCoord) -> Self {
        Self {
            coord,
            urgency: HashMap::new(),
            active: BTreeSet::new(),
            observations: 0,
        }
    }

    fn clear(&mut self) {
        self.urgency.clear();
        self.active.clear();
        self.observations = 0;
    }

    pub fn coord(&self) -> ZoneCoord {
        self.coord
    }

    /// Accumulated urgency for a category in this zone.
    pub fn urgency(&self, category: &CategoryKey) -> f64 {
        self.urgency.get(category).copied().unwrap_or(0.0)
    }

    /// Categories with positive urgency in this zone.
    pub fn active_categories(&self) -> &BTreeSet<CategoryKey> {
        &self.active
    }

    pub fn observation_count(&self) -> u32 {
        self.observations
    }

    pub fn total_urgency(&self) -> f64 {
        self.urgency.values().sum()
    }
}

/// Grid counters for the current scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GridStats {
    pub zones: usize,
    pub active_zones: usize,
    pub accepted: u64,
    pub dropped: u64,
}

impl std::fmt::Display for GridStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "grid: {}/{} zones active, {} observations accepted, {} dropped",
            self.active_zones, self.zones, self.accepted, self.dropped
        )
    }
}

/// Fixed-size zone index over the operating domain.
#[derive(Debug, Clone)]
pub struct DemandGrid {
    zone_size: i32,
    width: i32,
    height: i32,
    cols: usize,
    zones: Vec<Zone>,
    accepted: u64,
    dropped: u64,
}

impl DemandGrid {
    /// Builds the zone table for a validated grid config.
    pub fn new(config: &GridConfig) -> AssignResult<Self> {
        config.validate()?;
        let zone_size = to_i32(config.zone_size)?;
        let width = to_i32(config.domain_width)?;
        let height = to_i32(config.domain_height)?;
        let cols = to_i32(config.domain_width.div_ceil(config.zone_size))?;
        let rows = to_i32(config.domain_height.div_ceil(config.zone_size))?;

        let mut zones = Vec::with_capacity(cols as usize * rows as usize);
        for z in 0..rows {
            for x in 0..cols {
                zones.push(Zone::new(ZoneCoord { x, z }));
            }
        }

        Ok(Self {
            zone_size,
            width,
            height,
            cols: cols as usize,
            zones,
            accepted: 0,
            dropped: 0,
        })
    }

    /// Clears every zone accumulator. Called once at the start of a scan.
    pub fn reset(&mut self) {
        for zone in &mut self.zones {
            zone.clear();
        }
        self.accepted = 0;
        self.dropped = 0;
    }

    /// Zone containing a position, or `None` outside the domain.
    pub fn zone_of(&self, position: Position) -> Option<ZoneCoord> {
        if position.x < 0 || position.z < 0 || position.x >= self.width || position.z >= self.height
        {
            return None;
        }
        Some(ZoneCoord {
            x: position.x / self.zone_size,
            z: position.z / self.zone_size,
        })
    }

    fn index_of(&self, coord: ZoneCoord) -> usize {
        coord.z as usize * self.cols + coord.x as usize
    }

    /// Accumulates one observation. Returns false if it was dropped.
    pub fn add_observation(&mut self, observation: &Observation) -> bool {
        match &observation.category {
            Some(category) => self.add(observation.position, category, observation.urgency),
            None => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Accumulates `urgency` for `category` in the zone containing `position`.
    pub fn add(&mut self, position: Position, category: &CategoryKey, urgency: f64) -> bool {
        let Some(coord) = self.zone_of(position) else {
            self.dropped += 1;
            return false;
        };
        if !urgency.is_finite() || urgency < 0.0 {
            self.dropped += 1;
            return false;
        }

        let index = self.index_of(coord);
        let zone = &mut self.zones[index];
        zone.observations += 1;
        *zone.urgency.entry(category.clone()).or_insert(0.0) += urgency;
        if urgency > 0.0 {
            zone.active.insert(category.clone());
        }
        self.accepted += 1;
        true
    }

    /// Total urgency for a category across every zone.
    pub fn demand(&self, category: &CategoryKey) -> f64 {
        self.zones.iter().map(|zone| zone.urgency(category)).sum()
    }

    /// Union of the active-category sets of all zones.
    pub fn active_categories(&self) -> BTreeSet<CategoryKey> {
        self.zones
            .iter()
            .flat_map(|zone| zone.active.iter().cloned())
            .collect()
    }

    /// Zones that received at least one observation this scan.
    pub fn active_zones(&self) -> Vec<&Zone> {
        self.zones
            .iter()
            .filter(|zone| zone.observations > 0)
            .collect()
    }

    pub fn zone(&self, coord: ZoneCoord) -> Option<&Zone> {
        if coord.x < 0 || coord.z < 0 || coord.x as usize >= self.cols {
            return None;
        }
        self.zones.get(self.index_of(coord))
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            zones: self.zones.len(),
            active_zones: self.zones.iter().filter(|z| z.observations > 0).count(),
            accepted: self.accepted,
            dropped: self.dropped,
        }
    }
}

fn to_i32(value: u32) -> AssignResult<i32> {
    i32::try_from(value)
        .map_err(|_| AssignError::InvalidConfig(format!("grid extent {value} exceeds i32")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CategoryKey {
        CategoryKey::parse(s).unwrap()
    }

    fn grid() -> DemandGrid {
        DemandGrid::new(&GridConfig::default()).unwrap()
    }

    #[test]
    fn test_zone_mapping_uses_integer_division() {
        let grid = grid();
        assert_eq!(grid.zone_of(Position::new(0, 0)), Some(ZoneCoord { x: 0, z: 0 }));
        assert_eq!(grid.zone_of(Position::new(15, 15)), Some(ZoneCoord { x: 0, z: 0 }));
        assert_eq!(grid.zone_of(Position::new(16, 33)), Some(ZoneCoord { x: 1, z: 2 }));
        assert_eq!(grid.zone_of(Position::new(249, 249)), Some(ZoneCoord { x: 15, z: 15 }));
    }

    #[test]
    fn test_wide_domain_keeps_positions_positive() {
        let mut grid = DemandGrid::new(&GridConfig {
            zone_size: 1 << 24,
            domain_width: i32::MAX as u32,
            domain_height: 1 << 24,
        })
        .unwrap();
        assert!(grid.add(Position::new(10, 10), &key("a"), 1.0));
        assert!(grid.add(Position::new(i32::MAX - 1, 0), &key("a"), 1.0));
        assert_eq!(grid.demand(&key("a")), 2.0);
        assert_eq!(grid.zone_of(Position::new(i32::MAX - 1, 0)).unwrap().x, 127);
    }

    #[test]
    fn test_new_rejects_extent_beyond_i32() {
        let config = GridConfig {
            zone_size: 1 << 27,
            domain_width: 1 << 31,
            domain_height: 250,
        };
        assert!(matches!(DemandGrid::new(&config), Err(AssignError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_bounds_is_dropped() {
        let mut grid = grid();
        assert!(!grid.add(Position::new(-1, 4), &key("hauling"), 2.0));
        assert!(!grid.add(Position::new(250, 4), &key("hauling"), 2.0));
        assert!(!grid.add(Position::new(3, 1000), &key("hauling"), 2.0));
        assert_eq!(grid.demand(&key("hauling")), 0.0);
        assert_eq!(grid.stats().dropped, 3);
    }

    #[test]
    fn test_missing_category_is_dropped() {
        let mut grid = grid();
        let observation = Observation {
            position: Position::new(5, 5),
            category: None,
            urgency: 4.0,
        };
        assert!(!grid.add_observation(&observation));
        assert!(grid.active_zones().is_empty());
    }

    #[test]
    fn test_demand_sums_across_zones() {
        let mut grid = grid();
        grid.add(Position::new(1, 1), &key("hauling"), 2.0);
        grid.add(Position::new(2, 2), &key("hauling"), 3.0);
        grid.add(Position::new(100, 100), &key("hauling"), 5.0);
        grid.add(Position::new(100, 100), &key("medical"), 1.5);

        assert_eq!(grid.demand(&key("hauling")), 10.0);
        assert_eq!(grid.demand(&key("medical")), 1.5);
        assert_eq!(grid.active_zones().len(), 2);

        let origin = grid.zone(ZoneCoord { x: 0, z: 0 }).unwrap();
        assert_eq!(origin.observation_count(), 2);
        assert_eq!(origin.urgency(&key("hauling")), 5.0);
    }

    #[test]
    fn test_zero_urgency_counts_but_is_not_active() {
        let mut grid = grid();
        grid.add(Position::new(1, 1), &key("art"), 0.0);
        assert_eq!(grid.active_zones().len(), 1);
        assert!(grid.active_categories().is_empty());
    }

    #[test]
    fn test_active_categories_is_union() {
        let mut grid = grid();
        grid.add(Position::new(1, 1), &key("hauling"), 1.0);
        grid.add(Position::new(200, 1), &key("medical"), 1.0);
        grid.add(Position::new(200, 1), &key("hauling"), 1.0);
        let active: Vec<_> = grid.active_categories().into_iter().collect();
        assert_eq!(active, vec![key("hauling"), key("medical")]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut grid = grid();
        grid.add(Position::new(1, 1), &key("hauling"), 1.0);
        grid.reset();
        assert_eq!(grid.demand(&key("hauling")), 0.0);
        assert!(grid.active_zones().is_empty());
        assert_eq!(grid.stats(), GridStats { zones: 256, ..GridStats::default() });
    }

    #[test]
    fn test_negative_urgency_is_dropped() {
        let mut grid = grid();
        assert!(!grid.add(Position::new(1, 1), &key("hauling"), -3.0));
        assert!(!grid.add(Position::new(1, 1), &key("hauling"), f64::NAN));
        assert_eq!(grid.stats().accepted, 0);
    }
}
