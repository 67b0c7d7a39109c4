//! Scenario files: a scripted worker pool and workload in TOML.
//!
//! ```toml
//! name = "small colony"
//! categories = ["hauling", "medical"]
//!
//! [[workers]]
//! skills = { hauling = 4.0, medical = 1.5 }
//! activity = "no_task"
//! schedule = [{ at = 600, activity = { task = "haul_stone" } }]
//! pinned = [{ category = "medical", priority = 3 }]
//!
//! [[observations]]
//! x = 40
//! z = 12
//! category = "hauling"
//! urgency = 2.5
//! count = 4
//! until = 1200
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use weave_assign::{
    Activity, Assignment, CategoryConfig, EngineConfig, Observation, Position, Priority,
    Provenance, Worker,
};
use weave_id::{CategoryKey, Tick, WorkerId};

use crate::roster::{Roster, WorkloadSource};

/// Parsed scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub name: Option<String>,
    /// Registered categories; derived from worker skills when empty.
    #[serde(default)]
    pub categories: Vec<CategoryKey>,
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
    #[serde(default)]
    pub observations: Vec<ObservationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSpec {
    /// Generated when omitted.
    #[serde(default)]
    pub id: Option<WorkerId>,
    /// Presence of a key means the worker is capable of that category.
    #[serde(default)]
    pub skills: BTreeMap<CategoryKey, f64>,
    #[serde(default)]
    pub activity: Activity,
    /// Activity changes, applied in tick order.
    #[serde(default)]
    pub schedule: Vec<ActivityChange>,
    /// Assignments owned by someone else; the engine never removes them.
    #[serde(default)]
    pub pinned: Vec<PinnedAssignment>,
    #[serde(default)]
    pub joins_at: Option<Tick>,
    #[serde(default)]
    pub leaves_at: Option<Tick>,
}

impl WorkerSpec {
    fn present_at(&self, tick: Tick) -> bool {
        self.joins_at.is_none_or(|t| t <= tick) && self.leaves_at.is_none_or(|t| tick < t)
    }

    fn activity_at(&self, tick: Tick) -> &Activity {
        self.schedule
            .iter()
            .filter(|change| change.at <= tick)
            .max_by_key(|change| change.at)
            .map(|change| &change.activity)
            .unwrap_or(&self.activity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityChange {
    pub at: Tick,
    pub activity: Activity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinnedAssignment {
    pub category: CategoryKey,
    pub priority: Priority,
}

/// A source of observations active over a tick window `[from, until)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationSpec {
    pub x: i32,
    pub z: i32,
    #[serde(default)]
    pub category: Option<CategoryKey>,
    pub urgency: f64,
    /// Identical observations emitted per scan.
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub from: Option<Tick>,
    #[serde(default)]
    pub until: Option<Tick>,
}

fn default_count() -> u32 {
    1
}

impl ObservationSpec {
    fn active_at(&self, tick: Tick) -> bool {
        self.from.is_none_or(|t| t <= tick) && self.until.is_none_or(|t| tick < t)
    }
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid scenario: {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let scenario: ScenarioFile = toml::from_str(contents).context("invalid scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check worker ids are unique and pins name a capability.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            if let Some(id) = worker.id {
                if !ids.insert(id) {
                    anyhow::bail!("duplicate worker id {id}");
                }
            }
            for pin in &worker.pinned {
                if !worker.skills.contains_key(&pin.category) {
                    anyhow::bail!(
                        "worker #{index} pins '{}' without a skill for it",
                        pin.category
                    );
                }
            }
        }
        Ok(())
    }

    /// Category keys of the scenario, in declaration order.
    pub fn category_keys(&self) -> Vec<CategoryKey> {
        if !self.categories.is_empty() {
            return self.categories.clone();
        }
        let from_skills: BTreeSet<&CategoryKey> =
            self.workers.iter().flat_map(|w| w.skills.keys()).collect();
        from_skills.into_iter().cloned().collect()
    }

    /// Engine config for this scenario. A base config that already lists
    /// categories is kept as is.
    pub fn engine_config(&self, base: Option<EngineConfig>) -> EngineConfig {
        let mut config = base.unwrap_or_default();
        if config.categories.is_empty() {
            config.categories = self
                .category_keys()
                .into_iter()
                .map(CategoryConfig::new)
                .collect();
        }
        config
    }

    /// Observations emitted at `tick`.
    pub fn observations_at(&self, tick: Tick) -> Vec<Observation> {
        self.observations
            .iter()
            .filter(|spec| spec.active_at(tick))
            .flat_map(|spec| {
                let observation = Observation {
                    position: Position::new(spec.x, spec.z),
                    category: spec.category.clone(),
                    urgency: spec.urgency,
                };
                std::iter::repeat_n(observation, spec.count as usize)
            })
            .collect()
    }
}

/// In-memory roster and workload source replaying a scenario file.
pub struct ScenarioRoster {
    scenario: ScenarioFile,
    ids: Vec<WorkerId>,
    /// Last committed state per worker.
    committed: Mutex<BTreeMap<WorkerId, Worker>>,
}

impl ScenarioRoster {
    pub fn new(scenario: ScenarioFile) -> Self {
        let ids = scenario
            .workers
            .iter()
            .map(|w| w.id.unwrap_or_default())
            .collect();
        Self {
            scenario,
            ids,
            committed: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn scenario(&self) -> &ScenarioFile {
        &self.scenario
    }

    /// Workers as last committed, in scenario order.
    pub async fn snapshot(&self) -> Vec<Worker> {
        let committed = self.committed.lock().await;
        self.ids
            .iter()
            .filter_map(|id| committed.get(id).cloned())
            .collect()
    }

    fn fresh_worker(id: WorkerId, spec: &WorkerSpec) -> Result<Worker> {
        let mut worker = spec
            .skills
            .iter()
            .fold(Worker::new(id), |w, (category, skill)| {
                w.with_skill(category.clone(), *skill)
            });
        for pin in &spec.pinned {
            worker
                .assign(
                    pin.category.clone(),
                    Assignment::new(pin.priority, Provenance::External),
                )
                .with_context(|| format!("failed to pin {} for {id}", pin.category))?;
        }
        Ok(worker)
    }
}

#[async_trait]
impl Roster for ScenarioRoster {
    async fn active_workers(&self, tick: Tick) -> Result<Vec<Worker>> {
        let mut committed = self.committed.lock().await;
        let mut workers = Vec::new();

        for (id, spec) in self.ids.iter().zip(&self.scenario.workers) {
            if !spec.present_at(tick) {
                if committed.remove(id).is_some() {
                    info!(worker_id = %id, tick = %tick, "Worker left the pool");
                }
                continue;
            }

            let mut worker = match committed.get(id) {
                Some(worker) => worker.clone(),
                None => {
                    debug!(worker_id = %id, tick = %tick, "Worker joined the pool");
                    Self::fresh_worker(*id, spec)?
                }
            };
            worker.set_activity(spec.activity_at(tick).clone());
            workers.push(worker);
        }

        Ok(workers)
    }

    async fn commit(&self, workers: &[Worker]) -> Result<()> {
        let mut committed = self.committed.lock().await;
        for worker in workers {
            committed.insert(worker.id(), worker.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl WorkloadSource for ScenarioRoster {
    async fn scan(&self, tick: Tick) -> Result<Vec<Observation>> {
        Ok(self.scenario.observations_at(tick))
    }
}
