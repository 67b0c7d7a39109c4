//! # weave-id
//!
//! Stable identifier types, parsing, and validation for workweave.
//!
//! ## Design Principles
//!
//! - Worker IDs are stable and system-generated; category keys are config-controlled slugs
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed so a worker can never be passed where a category is expected
//! - The scheduling clock (`Tick`) is a plain monotonic counter, not wall time
//!
//! ## ID Format
//!
//! Worker IDs use a prefixed format: `{prefix}_{ulid}`, e.g.
//! `wkr_01HV4Z2WQXKJNM8GPQY6VBKC3D`. ULIDs sort by creation time, which gives
//! the engine a deterministic total order for tie-breaks and cache fingerprints.
//!
//! Category keys are lowercase slugs such as `construction` or `medical`.

mod error;
mod macros;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use macros::parse_prefixed;
pub use types::*;

pub use ulid::Ulid;
