//! Demand scoring for a single scan.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use weave_assign::{DemandRecord, DemandScorer, Zone};
use weave_id::Tick;
use weave_scheduler::roster::{Roster, WorkloadSource};
use weave_scheduler::scenario::ScenarioRoster;

use super::{load_scenario, CommandContext};
use crate::output::{print_info, print_output, print_single, OutputFormat};

#[derive(Debug, Args)]
pub struct ScoreCommand {
    /// Scenario file (TOML).
    pub scenario: PathBuf,

    /// Clock value to scan at.
    #[arg(long, default_value = "0")]
    pub tick: u64,

    /// Engine configuration replacing the defaults.
    #[arg(long)]
    pub engine_config: Option<PathBuf>,

    /// Also list the active zones.
    #[arg(long)]
    pub zones: bool,
}

impl ScoreCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (scenario, mut engine) = load_scenario(&self.scenario, self.engine_config.as_deref())?;
        let scorer = DemandScorer::new(&engine.config().scoring);
        let roster = ScenarioRoster::new(scenario);
        let tick = Tick::new(self.tick);

        let workers = roster.active_workers(tick).await?;
        let observations = roster.scan(tick).await?;
        let unregistered = engine.scan(&observations);
        let demand: Vec<DemandRecord> = engine.refresh_demand(&workers).iter().cloned().collect();

        if ctx.format == OutputFormat::Json {
            print_single(&ScoreOutput {
                tick,
                pool_size: workers.len(),
                observations: observations.len(),
                unregistered,
                demand,
                zones: engine.active_zones().into_iter().map(ZoneRow::from).collect(),
            });
            return Ok(());
        }

        print_info(&format!(
            "tick {tick}: {} workers, {} observations, {} active zones",
            workers.len(),
            observations.len(),
            engine.active_zones().len()
        ));
        if unregistered > 0 {
            print_info(&format!(
                "{unregistered} observations named unregistered categories and were dropped"
            ));
        }

        let rows: Vec<DemandRow> = demand
            .iter()
            .map(|record| DemandRow::new(record, &scorer))
            .collect();
        print_output(&rows, ctx.format);

        if self.zones {
            let zones: Vec<ZoneRow> = engine.active_zones().into_iter().map(ZoneRow::from).collect();
            print_output(&zones, ctx.format);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ScoreOutput {
    tick: Tick,
    pool_size: usize,
    observations: usize,
    unregistered: usize,
    demand: Vec<DemandRecord>,
    zones: Vec<ZoneRow>,
}

/// Demand record as shown in tables.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct DemandRow {
    #[tabled(rename = "Category")]
    pub category: String,

    #[tabled(rename = "Raw", display = "display_f64")]
    pub raw_demand: f64,

    #[tabled(rename = "Capable")]
    pub capable_workers: usize,

    #[tabled(rename = "Current")]
    pub current_workers: usize,

    #[tabled(rename = "Multiplier", display = "display_f64")]
    pub urgency_multiplier: f64,

    #[tabled(rename = "Normalized", display = "display_f64")]
    pub normalized_demand: f64,

    #[tabled(rename = "Wanted")]
    pub recommended_workers: usize,

    #[tabled(rename = "Status")]
    pub status: &'static str,
}

impl DemandRow {
    pub fn new(record: &DemandRecord, scorer: &DemandScorer) -> Self {
        let status = if scorer.is_overloaded(record) {
            "overloaded"
        } else if scorer.is_underutilized(record) {
            "underutilized"
        } else {
            "ok"
        };
        Self {
            category: record.category.to_string(),
            raw_demand: record.raw_demand,
            capable_workers: record.capable_workers,
            current_workers: record.current_workers,
            urgency_multiplier: record.urgency_multiplier,
            normalized_demand: record.normalized_demand,
            recommended_workers: record.recommended_workers,
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: String,

    #[tabled(rename = "Observations")]
    observations: u32,

    #[tabled(rename = "Urgency", display = "display_f64")]
    urgency: f64,

    #[tabled(rename = "Categories")]
    categories: String,
}

impl From<&Zone> for ZoneRow {
    fn from(zone: &Zone) -> Self {
        Self {
            zone: zone.coord().to_string(),
            observations: zone.observation_count(),
            urgency: zone.total_urgency(),
            categories: zone
                .active_categories()
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn display_f64(value: &f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_assign::ScoringConfig;
    use weave_id::CategoryKey;

    fn record(raw_demand: f64, current_workers: usize, normalized_demand: f64) -> DemandRecord {
        DemandRecord {
            category: CategoryKey::parse("hauling").unwrap(),
            raw_demand,
            capable_workers: 4,
            current_workers,
            urgency_multiplier: 1.0,
            normalized_demand,
            recommended_workers: 1,
        }
    }

    #[test]
    fn test_demand_row_status() {
        let scorer = DemandScorer::new(&ScoringConfig::default());
        let threshold = scorer.overload_threshold();

        let hot = DemandRow::new(&record(50.0, 1, threshold + 1.0), &scorer);
        assert_eq!(hot.status, "overloaded");

        let idle = DemandRow::new(&record(0.0, 3, 0.0), &scorer);
        assert_eq!(idle.status, "underutilized");

        let steady = DemandRow::new(&record(2.0, 1, threshold), &scorer);
        assert_eq!(steady.status, "ok");
        assert_eq!(steady.category, "hauling");
    }

    #[test]
    fn test_display_f64_rounds_to_two_places() {
        assert_eq!(display_f64(&1.0), "1.00");
        assert_eq!(display_f64(&2.5), "2.50");
    }
}
