//! Collaborator interfaces consumed by the scheduler loop.
//!
//! - [`Roster`] enumerates the live worker pool and takes back the
//!   assignments a cycle computed.
//! - [`WorkloadSource`] reports where work is waiting and how urgent it is.

use anyhow::Result;
use async_trait::async_trait;
use weave_assign::{Observation, Worker};
use weave_id::Tick;

/// The live worker pool.
#[async_trait]
pub trait Roster: Send + Sync {
    /// Workers present at `tick`, with their current activity and assignments.
    async fn active_workers(&self, tick: Tick) -> Result<Vec<Worker>>;

    /// Store the workers as updated by a cycle.
    async fn commit(&self, workers: &[Worker]) -> Result<()>;
}

/// The external workload scanner.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// Observations for the cycle running at `tick`.
    async fn scan(&self, tick: Tick) -> Result<Vec<Observation>>;
}
