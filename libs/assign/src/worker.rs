//! Worker data model: skills, assignments, and current activity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weave_id::{CategoryKey, WorkerId};

use crate::error::{AssignError, AssignResult};

/// Assignment priority. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// The most urgent level.
    pub const MOST_URGENT: Self = Self(1);

    /// The least urgent level.
    pub const LEAST_URGENT: Self = Self(4);

    /// Creates a priority, rejecting values outside 1..=4.
    pub fn new(level: u8) -> AssignResult<Self> {
        if (Self::MOST_URGENT.0..=Self::LEAST_URGENT.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(AssignError::InvalidPriority(level))
        }
    }

    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_most_urgent(&self) -> bool {
        self.0 == Self::MOST_URGENT.0
    }
}

impl TryFrom<u8> for Priority {
    type Error = AssignError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which part of the system produced an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Phase 1 minimum coverage.
    Coverage,
    /// Phase 2 demand scaling.
    Scale,
    /// Phase 3 redirection or an idle boost.
    Idle,
    /// Pinned by a collaborator; the engine never touches it.
    External,
}

impl Provenance {
    /// True for assignments the engine recomputes every cycle.
    pub fn is_engine_owned(&self) -> bool {
        !matches!(self, Provenance::External)
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provenance::Coverage => "coverage",
            Provenance::Scale => "scale",
            Provenance::Idle => "idle",
            Provenance::External => "external",
        };
        f.write_str(s)
    }
}

/// A worker's assignment to one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub priority: Priority,
    pub provenance: Provenance,
    /// Temporary assignments belong to the idle monitor and survive cycle resets.
    #[serde(default)]
    pub temporary: bool,
}

impl Assignment {
    pub fn new(priority: Priority, provenance: Provenance) -> Self {
        Self {
            priority,
            provenance,
            temporary: false,
        }
    }

    pub fn temporary(priority: Priority, provenance: Provenance) -> Self {
        Self {
            priority,
            provenance,
            temporary: true,
        }
    }
}

/// What a worker is doing right now, as reported by the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// Nothing to do.
    #[default]
    NoTask,
    /// Wandering around without purpose.
    Wandering,
    /// Running a named task.
    Task(String),
}

/// A pool member.
///
/// Skills double as capability flags: a worker is capable of exactly the
/// categories it has a skill entry for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    id: WorkerId,
    #[serde(default)]
    skills: BTreeMap<CategoryKey, f64>,
    #[serde(default)]
    assignments: BTreeMap<CategoryKey, Assignment>,
    #[serde(default)]
    activity: Activity,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            skills: BTreeMap::new(),
            assignments: BTreeMap::new(),
            activity: Activity::default(),
        }
    }

    /// Builder-style skill registration.
    #[must_use]
    pub fn with_skill(mut self, category: CategoryKey, skill: f64) -> Self {
        self.set_skill(category, skill);
        self
    }

    /// Builder-style activity.
    #[must_use]
    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = activity;
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn set_skill(&mut self, category: CategoryKey, skill: f64) {
        self.skills.insert(category, skill);
    }

    /// Drops the capability (and any engine-owned assignment) for a category.
    pub fn remove_skill(&mut self, category: &CategoryKey) {
        self.skills.remove(category);
        if self
            .assignments
            .get(category)
            .is_some_and(|a| a.provenance.is_engine_owned())
        {
            self.assignments.remove(category);
        }
    }

    pub fn is_capable(&self, category: &CategoryKey) -> bool {
        self.skills.contains_key(category)
    }

    /// Skill for a category; zero when not capable.
    pub fn skill(&self, category: &CategoryKey) -> f64 {
        self.skills.get(category).copied().unwrap_or(0.0)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = (&CategoryKey, f64)> {
        self.skills.iter().map(|(key, skill)| (key, *skill))
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
    }

    pub fn assignments(&self) -> &BTreeMap<CategoryKey, Assignment> {
        &self.assignments
    }

    pub fn assignment(&self, category: &CategoryKey) -> Option<&Assignment> {
        self.assignments.get(category)
    }

    pub fn holds(&self, category: &CategoryKey) -> bool {
        self.assignments.contains_key(category)
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Adds an assignment, rejecting a second one to the same category.
    pub fn assign(&mut self, category: CategoryKey, assignment: Assignment) -> AssignResult<()> {
        if self.assignments.contains_key(&category) {
            return Err(AssignError::DuplicateAssignment {
                worker: self.id,
                category,
            });
        }
        if !self.is_capable(&category) {
            return Err(AssignError::Incapable {
                worker: self.id,
                category,
            });
        }
        self.assignments.insert(category, assignment);
        Ok(())
    }

    /// Replaces whatever the worker holds for a category, returning the old value.
    pub(crate) fn override_assignment(
        &mut self,
        category: CategoryKey,
        assignment: Assignment,
    ) -> Option<Assignment> {
        self.assignments.insert(category, assignment)
    }

    /// Puts a category back to a previously captured state.
    ///
    /// An engine-owned assignment is only restored while the worker is still
    /// capable, matching what `remove_skill` would have done to it. Returns
    /// whether the worker still holds the category.
    pub(crate) fn restore_assignment(
        &mut self,
        category: &CategoryKey,
        previous: Option<Assignment>,
    ) -> bool {
        match previous {
            Some(assignment)
                if self.is_capable(category) || !assignment.provenance.is_engine_owned() =>
            {
                self.assignments.insert(category.clone(), assignment);
                true
            }
            _ => {
                self.assignments.remove(category);
                false
            }
        }
    }

    pub fn unassign(&mut self, category: &CategoryKey) -> Option<Assignment> {
        self.assignments.remove(category)
    }

    /// Clears last cycle's engine-owned assignments.
    ///
    /// External pins and temporary boosts are kept. Returns how many were cleared.
    pub fn release_engine_assignments(&mut self) -> usize {
        let before = self.assignments.len();
        self.assignments
            .retain(|_, a| a.temporary || !a.provenance.is_engine_owned());
        before - self.assignments.len()
    }
}
