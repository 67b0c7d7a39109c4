//! Chunked parallel execution for large worker pools.
//!
//! Small pools run inline. Pools at or above the threshold are split into
//! fixed-size chunks that are spread over a bounded set of scoped threads;
//! the call returns only after every chunk has finished.
//!
//! Every item owns exactly one output slot, so results never depend on
//! which thread ran which chunk. A failing or panicking item is logged and
//! skipped without touching its siblings.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ParallelConfig;
use crate::error::{AssignError, AssignResult};

/// How a batch was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    Sequential,
    Parallel { chunks: usize, threads: usize },
}

/// A per-item failure isolated by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub index: usize,
    #[serde(serialize_with = "serialize_error")]
    pub error: AssignError,
}

fn serialize_error<S: serde::Serializer>(error: &AssignError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Outputs of a batch, aligned with the input items.
#[derive(Debug)]
pub struct Batch<R> {
    pub mode: ExecutionMode,
    /// `None` where the item failed.
    pub outputs: Vec<Option<R>>,
    /// Failures in index order.
    pub failures: Vec<TaskFailure>,
}

impl<R> Batch<R> {
    pub fn succeeded(&self) -> usize {
        self.outputs.len() - self.failures.len()
    }
}

/// Sequential-or-parallel executor selected by pool size.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    threshold: usize,
    chunk_size: usize,
    max_parallelism: usize,
}

impl ParallelExecutor {
    pub fn new(config: &ParallelConfig) -> Self {
        Self {
            threshold: config.threshold,
            chunk_size: config.chunk_size.max(1),
            max_parallelism: config.max_parallelism.max(1),
        }
    }

    /// Execution mode for a batch of `len` items.
    pub fn mode_for(&self, len: usize) -> ExecutionMode {
        if len < self.threshold || len == 0 {
            return ExecutionMode::Sequential;
        }
        let chunks = len.div_ceil(self.chunk_size);
        ExecutionMode::Parallel {
            chunks,
            threads: chunks.min(self.max_parallelism),
        }
    }

    /// Run `op` on every item with exclusive access to it.
    pub fn for_each_mut<T, R, F>(&self, items: &mut [T], op: F) -> Batch<R>
    where
        T: Send,
        R: Send,
        F: Fn(&mut T) -> AssignResult<R> + Sync,
    {
        let len = items.len();
        let mut outputs: Vec<Option<R>> = items.iter().map(|_| None).collect();
        let units: Vec<_> = outputs
            .chunks_mut(self.chunk_size)
            .zip(items.chunks_mut(self.chunk_size))
            .enumerate()
            .map(|(n, (slots, chunk))| (n * self.chunk_size, slots, chunk))
            .collect();

        let mode = self.mode_for(len);
        let failures = self.run_units(mode, units, |(offset, slots, chunk)| {
            let mut failures = Vec::new();
            for (i, (slot, item)) in slots.iter_mut().zip(chunk.iter_mut()).enumerate() {
                match isolate(offset + i, || op(item)) {
                    Ok(output) => *slot = Some(output),
                    Err(failure) => failures.push(failure),
                }
            }
            failures
        });

        Batch {
            mode,
            outputs,
            failures,
        }
    }

    /// Compute one output per item from shared references.
    pub fn map<T, R, F>(&self, items: &[T], op: F) -> Batch<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> AssignResult<R> + Sync,
    {
        let mut outputs: Vec<Option<R>> = items.iter().map(|_| None).collect();
        let units: Vec<_> = outputs
            .chunks_mut(self.chunk_size)
            .zip(items.chunks(self.chunk_size))
            .enumerate()
            .map(|(n, (slots, chunk))| (n * self.chunk_size, slots, chunk))
            .collect();

        let mode = self.mode_for(items.len());
        let failures = self.run_units(mode, units, |(offset, slots, chunk)| {
            let mut failures = Vec::new();
            for (i, (slot, item)) in slots.iter_mut().zip(chunk.iter()).enumerate() {
                match isolate(offset + i, || op(item)) {
                    Ok(output) => *slot = Some(output),
                    Err(failure) => failures.push(failure),
                }
            }
            failures
        });

        Batch {
            mode,
            outputs,
            failures,
        }
    }

    /// Drive chunk units inline or across scoped threads; collects failures.
    fn run_units<U, W>(&self, mode: ExecutionMode, units: Vec<U>, work: W) -> Vec<TaskFailure>
    where
        U: Send,
        W: Fn(U) -> Vec<TaskFailure> + Sync,
    {
        let mut failures: Vec<TaskFailure> = match mode {
            ExecutionMode::Sequential => units.into_iter().flat_map(&work).collect(),
            ExecutionMode::Parallel { chunks, threads } => {
                debug!(chunks, threads, "Running batch in parallel");

                let mut buckets: Vec<Vec<U>> = (0..threads).map(|_| Vec::new()).collect();
                for (n, unit) in units.into_iter().enumerate() {
                    buckets[n % threads].push(unit);
                }

                let work = &work;
                std::thread::scope(|scope| {
                    let handles: Vec<_> = buckets
                        .into_iter()
                        .map(|bucket| {
                            scope.spawn(move || bucket.into_iter().flat_map(work).collect::<Vec<_>>())
                        })
                        .collect();
                    handles
                        .into_iter()
                        .flat_map(|handle| handle.join().unwrap_or_default())
                        .collect()
                })
            }
        };

        failures.sort_by_key(|f| f.index);
        for failure in &failures {
            warn!(index = failure.index, error = %failure.error, "Per-worker task failed");
        }
        failures
    }
}

/// Run one item, converting errors and panics into a `TaskFailure`.
fn isolate<R>(index: usize, f: impl FnOnce() -> AssignResult<R>) -> Result<R, TaskFailure> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(error)) => Err(TaskFailure { index, error }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskFailure {
                index,
                error: AssignError::TaskPanicked { index, message },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn executor(threshold: usize, chunk_size: usize) -> ParallelExecutor {
        ParallelExecutor::new(&ParallelConfig {
            threshold,
            chunk_size,
            max_parallelism: 4,
        })
    }

    #[test]
    fn test_mode_switches_at_threshold() {
        let exec = executor(50, 25);
        assert_eq!(exec.mode_for(49), ExecutionMode::Sequential);
        assert_eq!(
            exec.mode_for(50),
            ExecutionMode::Parallel { chunks: 2, threads: 2 }
        );
        assert_eq!(
            exec.mode_for(400),
            ExecutionMode::Parallel { chunks: 16, threads: 4 }
        );
    }

    #[test]
    fn test_for_each_mut_touches_every_item_once() {
        let exec = executor(10, 3);
        let mut items: Vec<u32> = (0..100).collect();
        let batch = exec.for_each_mut(&mut items, |n| {
            *n *= 2;
            Ok(*n)
        });
        assert!(matches!(batch.mode, ExecutionMode::Parallel { .. }));
        assert!(batch.failures.is_empty());
        assert_eq!(items, (0..100).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(batch.outputs[7], Some(14));
    }

    #[test]
    fn test_failures_are_isolated() {
        let exec = executor(10, 4);
        let mut items: Vec<u32> = (0..60).collect();
        let batch = exec.for_each_mut(&mut items, |n| {
            if *n == 13 {
                panic!("boom");
            }
            if *n == 40 {
                return Err(AssignError::InvalidPriority(9));
            }
            *n += 1;
            Ok(())
        });

        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.failures[0].index, 13);
        assert!(batch.failures[0].error.is_panic());
        assert_eq!(batch.failures[1].error, AssignError::InvalidPriority(9));
        assert_eq!(batch.succeeded(), 58);
        assert_eq!(items[12], 13);
        assert_eq!(items[14], 15);
        assert_eq!(items[13], 13);
    }

    #[test]
    fn test_map_keeps_alignment() {
        let exec = executor(5, 2);
        let items: Vec<i64> = (0..11).collect();
        let batch = exec.map(&items, |n| Ok(n * n));
        let squares: Vec<_> = batch.outputs.into_iter().map(Option::unwrap).collect();
        assert_eq!(squares, (0..11).map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_batch() {
        let exec = executor(0, 25);
        let mut items: Vec<u8> = Vec::new();
        let batch = exec.for_each_mut(&mut items, |_| Ok(()));
        assert_eq!(batch.mode, ExecutionMode::Sequential);
        assert!(batch.outputs.is_empty());
    }

    proptest! {
        #[test]
        fn prop_parallel_matches_sequential(values in proptest::collection::vec(0u32..1000, 0..300)) {
            let op = |n: &mut u32| -> AssignResult<u32> {
                *n = n.wrapping_mul(31).wrapping_add(7);
                Ok(*n % 17)
            };

            let mut sequential = values.clone();
            let seq = executor(usize::MAX, 25).for_each_mut(&mut sequential, op);
            let mut parallel = values.clone();
            let par = executor(1, 7).for_each_mut(&mut parallel, op);

            prop_assert_eq!(sequential, parallel);
            prop_assert_eq!(seq.outputs, par.outputs);
        }
    }
}
