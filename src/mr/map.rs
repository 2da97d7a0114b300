//! The map phase: applies the map function to every token on a worker pool

use std::fmt::Display;

use rayon::prelude::*;
use tracing::debug;

use crate::mr::{
    error::{MapReduceError, TaskFailure},
    worker::{guarded, KeyValue, Stage, StageOptions, TaskOutcome, WorkerPool},
};

/// Everything the map phase produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOutput<K, V> {
    /// One pair per successfully mapped token, in no particular order
    pub pairs: Vec<KeyValue<K, V>>,
    /// Tokens whose contribution was dropped
    pub failures: Vec<TaskFailure>,
}

/// Maps every token independently on a pool acquired for this call
///
/// Blocks until all map tasks are finished; the pool is released before returning.
/// Under [`FailurePolicy::BestEffort`](crate::mr::FailurePolicy::BestEffort) a failing
/// token is dropped and reported in [`MapOutput::failures`]; under `Strict` the whole
/// phase fails with [`MapReduceError::TaskFailed`].
pub fn map_all<T, K, V, F>(
    tokens: &[T],
    map_fn: F,
    options: &StageOptions,
) -> Result<MapOutput<K, V>, MapReduceError>
where
    T: Display + Sync,
    K: Send,
    V: Send,
    F: Fn(&T) -> anyhow::Result<KeyValue<K, V>> + Sync + Send,
{
    let pool = WorkerPool::acquire(Stage::Map, options)?;
    debug!(
        "[Map] Mapping {} token(s) on {} worker(s)",
        tokens.len(),
        pool.size()
    );

    let outcomes = pool.run_all(tokens.par_iter().enumerate(), |(index, token)| {
        match guarded(|| map_fn(token)) {
            Ok(pair) => TaskOutcome::Done(pair),
            Err(reason) => TaskOutcome::Failed(TaskFailure::Map {
                index,
                token: token.to_string(),
                reason,
            }),
        }
    });
    let (pairs, failures) = pool.settle(outcomes)?;

    debug!(
        "[Map] Finished with {} pair(s) and {} failure(s)",
        pairs.len(),
        failures.len()
    );
    Ok(MapOutput { pairs, failures })
}
