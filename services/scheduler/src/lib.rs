//! workweave scheduler service.
//!
//! This crate primarily ships a `weave-scheduler` binary, but exposes a
//! library surface so the cycle loop, roster traits and scenario loader can
//! be reused by the CLI and exercised by integration tests.

pub mod config;
pub mod roster;
pub mod scenario;
pub mod worker;
