//! Scenario simulation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use weave_assign::{Activity, CycleReport, DemandScorer, Worker};
use weave_scheduler::scenario::ScenarioRoster;
use weave_scheduler::worker::{SchedulerWorker, SchedulerWorkerConfig};

use super::score::DemandRow;
use super::{load_scenario, CommandContext};
use crate::output::{
    print_info, print_output, print_single, print_success, print_warning, OutputFormat,
};

#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Scenario file (TOML).
    pub scenario: PathBuf,

    /// Number of cycles to run.
    #[arg(long, default_value = "10")]
    pub cycles: u64,

    /// Clock ticks between cycles.
    #[arg(long, default_value = "60")]
    pub ticks_per_cycle: u64,

    /// Engine configuration replacing the defaults.
    #[arg(long)]
    pub engine_config: Option<PathBuf>,

    /// Only print the final tables.
    #[arg(long)]
    pub quiet: bool,
}

impl SimulateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        ensure!(self.cycles > 0, "--cycles must be at least 1");
        ensure!(self.ticks_per_cycle > 0, "--ticks-per-cycle must be at least 1");

        let (scenario, engine) = load_scenario(&self.scenario, self.engine_config.as_deref())?;
        let scorer = DemandScorer::new(&engine.config().scoring);
        let name = scenario.name.clone();

        let roster = Arc::new(ScenarioRoster::new(scenario));
        let worker = SchedulerWorker::new(
            engine,
            roster.clone(),
            roster.clone(),
            SchedulerWorkerConfig {
                ticks_per_cycle: self.ticks_per_cycle,
                max_cycles: Some(self.cycles),
                ..SchedulerWorkerConfig::default()
            },
        );

        if ctx.format == OutputFormat::Table {
            if let Some(name) = &name {
                print_info(&format!("Simulating {name}"));
            }
        }

        let mut reports = Vec::with_capacity(self.cycles as usize);
        for _ in 0..self.cycles {
            let report = worker.run_cycle().await?;
            if ctx.format == OutputFormat::Table && !self.quiet {
                print_cycle(&report, &scorer);
            }
            reports.push(report);
        }

        let assignments = assignment_rows(&roster.snapshot().await);
        match ctx.format {
            OutputFormat::Json => {
                print_single(&SimulationOutput {
                    scenario: name,
                    cycles: reports,
                    assignments,
                });
            }
            OutputFormat::Table => {
                let summary: Vec<CycleRow> = reports.iter().map(CycleRow::from).collect();
                print_output(&summary, ctx.format);
                print_output(&assignments, ctx.format);
                for line in worker.stats().await.to_string().lines() {
                    print_info(line);
                }
                print_success(&format!("{} cycles simulated", reports.len()));
            }
        }
        Ok(())
    }
}

fn print_cycle(report: &CycleReport, scorer: &DemandScorer) {
    print_info(&format!(
        "cycle {} at tick {}: {} workers, {} assignments added, {} released",
        report.cycle,
        report.tick,
        report.pool_size,
        report.assignments_added(),
        report.released
    ));
    let uncovered = report
        .coverage
        .uncovered
        .iter()
        .chain(&report.redirect.recovered.uncovered);
    for category in uncovered {
        print_warning(&format!("no worker can cover {category}"));
    }
    for (worker, category) in &report.redirect.idle.boosted {
        print_info(&format!("idle worker {worker} boosted onto {category}"));
    }
    let rows: Vec<DemandRow> = report
        .demand
        .iter()
        .map(|record| DemandRow::new(record, scorer))
        .collect();
    print_output(&rows, OutputFormat::Table);
}

#[derive(Debug, Serialize)]
struct SimulationOutput {
    scenario: Option<String>,
    cycles: Vec<CycleReport>,
    assignments: Vec<AssignmentRow>,
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct CycleRow {
    #[tabled(rename = "Cycle")]
    cycle: u64,

    #[tabled(rename = "Tick")]
    tick: u64,

    #[tabled(rename = "Workers")]
    workers: usize,

    #[tabled(rename = "Added")]
    added: usize,

    #[tabled(rename = "Uncovered")]
    uncovered: usize,

    #[tabled(rename = "Boosted")]
    boosted: usize,

    #[tabled(rename = "Reverted")]
    reverted: usize,

    #[tabled(rename = "Took (ms)")]
    duration_ms: u64,
}

impl From<&CycleReport> for CycleRow {
    fn from(report: &CycleReport) -> Self {
        Self {
            cycle: report.cycle,
            tick: report.tick.value(),
            workers: report.pool_size,
            added: report.assignments_added(),
            uncovered: report.coverage.uncovered.len() + report.redirect.recovered.uncovered.len(),
            boosted: report.redirect.idle.boosted.len(),
            reverted: report.redirect.idle.reverted.len(),
            duration_ms: report.duration_ms,
        }
    }
}

/// One held assignment, flattened for display.
#[derive(Debug, Clone, Serialize, Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Worker")]
    worker: String,

    #[tabled(rename = "Category")]
    category: String,

    #[tabled(rename = "Priority")]
    priority: u8,

    #[tabled(rename = "Source")]
    provenance: String,

    #[tabled(rename = "Temporary")]
    temporary: bool,

    #[tabled(rename = "Activity")]
    activity: String,
}

fn assignment_rows(workers: &[Worker]) -> Vec<AssignmentRow> {
    workers
        .iter()
        .flat_map(|worker| {
            worker
                .assignments()
                .iter()
                .map(move |(category, assignment)| AssignmentRow {
                    worker: worker.id().to_string(),
                    category: category.to_string(),
                    priority: assignment.priority.value(),
                    provenance: assignment.provenance.to_string(),
                    temporary: assignment.temporary,
                    activity: display_activity(worker.activity()),
                })
        })
        .collect()
}

fn display_activity(activity: &Activity) -> String {
    match activity {
        Activity::NoTask => "no task".to_string(),
        Activity::Wandering => "wandering".to_string(),
        Activity::Task(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_assign::{Assignment, Priority, Provenance};
    use weave_id::{CategoryKey, WorkerId};

    #[test]
    fn test_assignment_rows_flatten_every_held_category() {
        let hauling = CategoryKey::parse("hauling").unwrap();
        let art = CategoryKey::parse("art").unwrap();
        let mut worker = Worker::new(WorkerId::new())
            .with_skill(hauling.clone(), 2.0)
            .with_skill(art.clone(), 1.0)
            .with_activity(Activity::Task("haul".to_string()));
        worker
            .assign(
                hauling,
                Assignment::new(Priority::new(1).unwrap(), Provenance::Coverage),
            )
            .unwrap();
        worker
            .assign(
                art,
                Assignment::temporary(Priority::new(1).unwrap(), Provenance::Idle),
            )
            .unwrap();
        let idle = Worker::new(WorkerId::new());

        let rows = assignment_rows(&[worker, idle]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "art");
        assert!(rows[0].temporary);
        assert_eq!(rows[1].provenance, "coverage");
        assert_eq!(rows[1].activity, "haul");
    }

    #[test]
    fn test_display_activity() {
        assert_eq!(display_activity(&Activity::NoTask), "no task");
        assert_eq!(display_activity(&Activity::Wandering), "wandering");
    }
}
