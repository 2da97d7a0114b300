//! The reduce phase: aggregates each key's group on a worker pool

use std::{collections::HashMap, fmt::Display, hash::Hash};

use tracing::debug;

use crate::mr::{
    error::{MapReduceError, TaskFailure},
    shuffle::ShuffleGroup,
    worker::{guarded, Stage, StageOptions, TaskOutcome, WorkerPool},
};

/// Everything the reduce phase produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOutput<K: Eq + Hash, R> {
    /// One entry per successfully reduced key
    pub results: HashMap<K, R>,
    /// Keys left out of `results`
    pub failures: Vec<TaskFailure>,
}

/// Reduces every group independently on a pool acquired for this call
///
/// There is exactly one task per key and each task hands back its own key with the
/// result, so no two tasks can ever write the same entry of the final map. Blocks
/// until every task is finished; the pool is released before returning.
pub fn reduce_all<K, V, R, F>(
    group: ShuffleGroup<K, V>,
    reduce_fn: F,
    options: &StageOptions,
) -> Result<ReduceOutput<K, R>, MapReduceError>
where
    K: Eq + Hash + Display + Send,
    V: Send,
    R: Send,
    F: Fn(&K, &[V]) -> anyhow::Result<R> + Sync + Send,
{
    let pool = WorkerPool::acquire(Stage::Reduce, options)?;
    debug!(
        "[Reduce] Reducing {} key(s) on {} worker(s)",
        group.len(),
        pool.size()
    );

    let tasks: Vec<(K, Vec<V>)> = group.into_iter().collect();
    let outcomes = pool.run_all(tasks, |(key, values)| {
        match guarded(|| reduce_fn(&key, values.as_slice())) {
            Ok(result) => TaskOutcome::Done((key, result)),
            Err(reason) => TaskOutcome::Failed(TaskFailure::Reduce {
                key: key.to_string(),
                reason,
            }),
        }
    });
    let (reduced, failures) = pool.settle(outcomes)?;
    let results: HashMap<K, R> = reduced.into_iter().collect();

    debug!(
        "[Reduce] Finished with {} key(s) and {} failure(s)",
        results.len(),
        failures.len()
    );
    Ok(ReduceOutput { results, failures })
}
