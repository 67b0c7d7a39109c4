//! Error types for the assignment engine.
//!
//! Only genuinely invalid input is an error. The non-fatal outcomes of a
//! cycle (uncovered categories, idle workers with no redirect target,
//! per-worker task failures) are reported in the cycle report instead.

use thiserror::Error;
use weave_id::{CategoryKey, WorkerId};

/// Result type for engine operations.
pub type AssignResult<T> = Result<T, AssignError>;

/// Errors raised by the assignment engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssignError {
    /// The worker already holds an assignment to this category.
    #[error("worker {worker} already holds an assignment to {category}")]
    DuplicateAssignment {
        worker: WorkerId,
        category: CategoryKey,
    },

    /// The worker cannot perform this category.
    #[error("worker {worker} is not capable of {category}")]
    Incapable {
        worker: WorkerId,
        category: CategoryKey,
    },

    /// The category is not registered.
    #[error("unknown category: {0}")]
    UnknownCategory(CategoryKey),

    /// Priority outside the supported ordinal range.
    #[error("invalid priority {0}: expected 1..=4")]
    InvalidPriority(u8),

    /// The engine configuration failed validation.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// A per-worker task panicked inside the parallel executor.
    #[error("task #{index} panicked: {message}")]
    TaskPanicked { index: usize, message: String },
}

impl AssignError {
    /// Returns true if this error came from an isolated task panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, AssignError::TaskPanicked { .. })
    }
}
