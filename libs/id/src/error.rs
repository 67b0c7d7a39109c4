//! Parse errors for worker IDs and category keys.

use thiserror::Error;

/// Why a worker ID or category key was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    /// A worker ID carried some other type's prefix.
    #[error("expected a '{expected}_' identifier, got prefix '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("identifier has no '_' between prefix and ULID")]
    MissingSeparator,

    #[error("malformed ULID: {0}")]
    InvalidUlid(String),

    /// A category key that is not a lowercase slug.
    #[error("{message}")]
    InvalidFormat { message: String },
}

impl IdError {
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
