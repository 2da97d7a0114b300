use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace, warn};

use crate::mr::{
    config::{Concurrency, FailurePolicy},
    error::{panic_message, MapReduceError, TaskFailure},
};

/// The intermediate record emitted once per token by a map task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> KeyValue<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Shared flag used to abort a run cooperatively
/// Every task checks it before doing any work, so setting it drains the pools quickly
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    /// Flags of the tokens this one was linked with, any of them cancels this token too
    upstream: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.upstream.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// A fresh token that reads as cancelled once `self` or `other` is
    /// Cancelling the returned token leaves both inputs untouched
    pub fn linked_with(&self, other: &CancelToken) -> CancelToken {
        let mut upstream = vec![self.flag.clone(), other.flag.clone()];
        upstream.extend(self.upstream.iter().cloned());
        upstream.extend(other.upstream.iter().cloned());
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            upstream,
        }
    }
}

/// The two pool-backed phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Map,
    Reduce,
}

impl Stage {
    /// Used for pool and thread naming
    pub fn worker_name(&self) -> &'static str {
        match self {
            Stage::Map => "mapper",
            Stage::Reduce => "reducer",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Stage::Map => "[Map]",
            Stage::Reduce => "[Reduce]",
        }
    }
}

/// Everything a stage needs to size and police its worker pool
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub concurrency: Concurrency,
    pub policy: FailurePolicy,
    pub cancel: CancelToken,
}

impl StageOptions {
    pub fn new(concurrency: Concurrency, policy: FailurePolicy, cancel: CancelToken) -> Self {
        Self {
            concurrency,
            policy,
            cancel,
        }
    }
}

/// The result of running one task on the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Done(T),
    Failed(TaskFailure),
    /// Never started because the run was cancelled or aborted
    Skipped,
}

/// A worker pool scoped to a single stage
/// It is acquired when the stage starts and torn down when dropped, which always
/// happens before the stage function returns
pub struct WorkerPool {
    stage: Stage,
    pool: ThreadPool,
    policy: FailurePolicy,
    /// The caller's token, set from outside the run
    cancel: CancelToken,
    /// Set by the pool itself when a task fails under the strict policy
    abort: AtomicBool,
}

impl WorkerPool {
    pub fn acquire(stage: Stage, options: &StageOptions) -> Result<Self, MapReduceError> {
        let name = stage.worker_name();
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.concurrency.num_threads())
            .thread_name(move |i| format!("{}-{}", name, i))
            .build()
            .map_err(|source| MapReduceError::PoolBuild {
                stage: name,
                source,
            })?;
        debug!(
            "{} Acquired {} pool with {} worker(s) (requested {})",
            stage.tag(),
            name,
            pool.current_num_threads(),
            options.concurrency
        );
        Ok(Self {
            stage,
            pool,
            policy: options.policy,
            cancel: options.cancel.clone(),
            abort: AtomicBool::new(false),
        })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn should_stop(&self) -> bool {
        self.abort.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    /// Runs `task` once per input on the pool and blocks until every task has finished
    /// Output order follows input order when the input is indexed
    pub fn run_all<P, O, F>(&self, inputs: P, task: F) -> Vec<TaskOutcome<O>>
    where
        P: IntoParallelIterator + Send,
        O: Send,
        F: Fn(P::Item) -> TaskOutcome<O> + Sync + Send,
    {
        self.pool.install(|| {
            inputs
                .into_par_iter()
                .map(|input| {
                    if self.should_stop() {
                        return TaskOutcome::Skipped;
                    }
                    let outcome = task(input);
                    if let TaskOutcome::Failed(failure) = &outcome {
                        warn!("{} {}", self.stage.tag(), failure);
                        if self.policy == FailurePolicy::Strict {
                            // No point in starting anything else, the stage is lost
                            self.abort.store(true, Ordering::SeqCst);
                        }
                    }
                    outcome
                })
                .collect()
        })
    }

    /// Splits the outcomes into results and failures, applying the failure policy
    pub fn settle<T>(
        &self,
        outcomes: Vec<TaskOutcome<T>>,
    ) -> Result<(Vec<T>, Vec<TaskFailure>), MapReduceError> {
        let mut done = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut skipped = 0usize;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Done(value) => done.push(value),
                TaskOutcome::Failed(failure) => failures.push(failure),
                TaskOutcome::Skipped => skipped += 1,
            }
        }

        // An explicit abort wins over whatever the tasks reported
        let cancelled = self.cancel.is_cancelled();
        if !cancelled && self.policy == FailurePolicy::Strict && !failures.is_empty() {
            return Err(MapReduceError::TaskFailed(failures.swap_remove(0)));
        }
        if cancelled || skipped > 0 {
            debug!(
                "{} Cancelled with {} task(s) left unstarted",
                self.stage.tag(),
                skipped
            );
            return Err(MapReduceError::Cancelled);
        }
        Ok((done, failures))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        trace!(
            "{} Releasing {} pool",
            self.stage.tag(),
            self.stage.worker_name()
        );
    }
}

/// Runs a user function, turning both errors and panics into a failure reason
pub fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(panic_message(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(concurrency: Concurrency, policy: FailurePolicy) -> StageOptions {
        StageOptions::new(concurrency, policy, CancelToken::new())
    }

    fn fail(key: &str) -> TaskFailure {
        TaskFailure::Reduce {
            key: key.to_string(),
            reason: "bad".to_string(),
        }
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_linked_token_follows_either_side() {
        let run = CancelToken::new();
        let kill_switch = CancelToken::new();
        let linked = run.linked_with(&kill_switch);
        assert!(!linked.is_cancelled());

        kill_switch.cancel();
        assert!(linked.is_cancelled());
        assert!(!run.is_cancelled());

        let other_run = CancelToken::new();
        let linked = other_run.linked_with(&CancelToken::new());
        other_run.cancel();
        assert!(linked.is_cancelled());
    }

    #[test]
    fn test_cancelling_linked_token_leaves_inputs_alone() {
        let run = CancelToken::new();
        let kill_switch = CancelToken::new();
        let linked = run.linked_with(&kill_switch);
        linked.cancel();
        assert!(linked.is_cancelled());
        assert!(!run.is_cancelled());
        assert!(!kill_switch.is_cancelled());
    }

    #[test]
    fn test_bounded_pool_size() {
        let pool = WorkerPool::acquire(
            Stage::Map,
            &options(Concurrency::bounded(3).unwrap(), FailurePolicy::BestEffort),
        )
        .unwrap();
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn test_workers_are_named_after_stage() {
        let pool = WorkerPool::acquire(
            Stage::Reduce,
            &options(Concurrency::serial(), FailurePolicy::BestEffort),
        )
        .unwrap();
        let names = pool.run_all(vec![()], |_| {
            TaskOutcome::Done(std::thread::current().name().map(str::to_string))
        });
        assert_eq!(names, vec![TaskOutcome::Done(Some("reducer-0".to_string()))]);
    }

    #[test]
    fn test_run_all_keeps_indexed_order() {
        let pool = WorkerPool::acquire(
            Stage::Map,
            &options(Concurrency::bounded(4).unwrap(), FailurePolicy::BestEffort),
        )
        .unwrap();
        let outcomes = pool.run_all((0..100).collect::<Vec<u32>>(), |n| TaskOutcome::Done(n * 2));
        let (done, failures) = pool.settle(outcomes).unwrap();
        assert_eq!(done, (0..100).map(|n| n * 2).collect::<Vec<_>>());
        assert!(failures.is_empty());
    }

    #[test]
    fn test_settle_best_effort_keeps_failures() {
        let pool = WorkerPool::acquire(
            Stage::Reduce,
            &options(Concurrency::serial(), FailurePolicy::BestEffort),
        )
        .unwrap();
        let outcomes = vec![
            TaskOutcome::Done(1),
            TaskOutcome::Failed(fail("a")),
            TaskOutcome::Done(2),
        ];
        let (done, failures) = pool.settle(outcomes).unwrap();
        assert_eq!(done, vec![1, 2]);
        assert_eq!(failures, vec![fail("a")]);
    }

    #[test]
    fn test_settle_strict_reports_cancel_over_failure() {
        let opts = options(Concurrency::serial(), FailurePolicy::Strict);
        let pool = WorkerPool::acquire(Stage::Map, &opts).unwrap();
        opts.cancel.cancel();
        let outcomes = vec![TaskOutcome::Failed(fail("a")), TaskOutcome::Done(1)];
        assert!(matches!(pool.settle(outcomes), Err(MapReduceError::Cancelled)));
    }

    #[test]
    fn test_settle_strict_returns_first_failure() {
        let pool = WorkerPool::acquire(
            Stage::Reduce,
            &options(Concurrency::serial(), FailurePolicy::Strict),
        )
        .unwrap();
        let outcomes = vec![
            TaskOutcome::Done(1),
            TaskOutcome::Failed(fail("a")),
            TaskOutcome::Failed(fail("b")),
            TaskOutcome::Skipped,
        ];
        match pool.settle(outcomes) {
            Err(MapReduceError::TaskFailed(failure)) => assert_eq!(failure, fail("a")),
            other => panic!("expected TaskFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_strict_failure_skips_remaining_tasks_on_serial_pool() {
        let pool = WorkerPool::acquire(
            Stage::Reduce,
            &options(Concurrency::serial(), FailurePolicy::Strict),
        )
        .unwrap();
        let outcomes = pool.run_all((0..10).collect::<Vec<u32>>(), |n| {
            if n == 0 {
                TaskOutcome::Failed(fail("zero"))
            } else {
                TaskOutcome::Done(n)
            }
        });
        assert_eq!(outcomes[0], TaskOutcome::Failed(fail("zero")));
        assert!(outcomes.iter().any(|o| *o == TaskOutcome::Skipped));
    }

    #[test]
    fn test_cancelled_pool_skips_everything() {
        let opts = options(Concurrency::bounded(2).unwrap(), FailurePolicy::BestEffort);
        opts.cancel.cancel();
        let pool = WorkerPool::acquire(Stage::Map, &opts).unwrap();
        let outcomes = pool.run_all(vec![1, 2, 3], TaskOutcome::Done);
        assert!(outcomes.iter().all(|o| *o == TaskOutcome::Skipped));
        assert!(matches!(pool.settle(outcomes), Err(MapReduceError::Cancelled)));
    }

    #[test]
    fn test_guarded_catches_errors_and_panics() {
        assert_eq!(guarded(|| Ok(5)), Ok(5));
        assert_eq!(
            guarded::<()>(|| Err(anyhow::anyhow!("outer").context("ctx"))),
            Err("ctx: outer".to_string())
        );
        assert_eq!(guarded::<()>(|| panic!("kaboom")), Err("kaboom".to_string()));
    }
}
