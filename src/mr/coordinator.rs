use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    hash::Hash,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::mr::{
    config::{Concurrency, MapReduceConfig},
    error::{MapReduceError, TaskFailure},
    function::wc,
    map::map_all,
    reduce::reduce_all,
    shuffle::group,
    tokenizer::Tokenizer,
    worker::{CancelToken, KeyValue, StageOptions},
};

/// The word counts of one run, plus every task that did not make it into them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frequencies {
    /// Word to occurrence count, in no particular order
    pub counts: HashMap<String, u64>,
    /// Empty when the counts are complete
    pub failures: Vec<TaskFailure>,
}

impl Frequencies {
    /// `false` if any map or reduce task was dropped
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<u64> {
        self.counts.get(word).copied()
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Drives tokenize -> map -> shuffle -> reduce for one body of text at a time
/// Each phase acquires its own worker pool and drains it before the next phase starts
#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    config: MapReduceConfig,
    /// Kill switch, linked into every run this coordinator (or a clone of it) starts
    cancel: CancelToken,
}

impl Coordinator {
    pub fn new(config: MapReduceConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &MapReduceConfig {
        &self.config
    }

    /// The kill switch shared by this coordinator and all its clones
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Kill switch: aborts every in-flight run on this coordinator and its clones,
    /// and makes every later run return `Cancelled`
    ///
    /// To abort a single run, pass a token to [`Coordinator::run_with_token`] instead.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn stage_options(&self, concurrency: Concurrency, cancel: &CancelToken) -> StageOptions {
        StageOptions::new(concurrency, self.config.failure_policy, cancel.clone())
    }

    /// Counts the words of `text`, keeping only `allowed` words when given
    pub fn run(
        &self,
        text: &str,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Frequencies, MapReduceError> {
        self.run_with_token(text, allowed, &CancelToken::new())
    }

    /// Like [`Coordinator::run`], but also aborts once `cancel` is tripped
    /// Cancelling `cancel` only affects this run, the coordinator stays usable
    pub fn run_with_token(
        &self,
        text: &str,
        allowed: Option<&HashSet<String>>,
        cancel: &CancelToken,
    ) -> Result<Frequencies, MapReduceError> {
        let started = Instant::now();
        let cancel = cancel.linked_with(&self.cancel);
        ensure_not_cancelled(&cancel)?;

        let tokens = Tokenizer::new()
            .with_vocabulary(allowed)
            .with_case_fold(self.config.case_fold)
            .tokenize(text);
        debug!("[Tokenize] {} token(s) from {} byte(s)", tokens.len(), text.len());
        if tokens.is_empty() {
            info!("[MapReduce] No tokens to count");
            return Ok(Frequencies::default());
        }

        let (counts, failures) = self.execute_with(&tokens, wc::map, wc::reduce, &cancel)?;
        info!(
            "[MapReduce] Counted {} distinct word(s) from {} token(s) in {:?}",
            counts.len(),
            tokens.len(),
            started.elapsed()
        );
        Ok(Frequencies { counts, failures })
    }

    /// Runs an arbitrary map/reduce pair over `inputs`
    /// Returns the reduced results together with the failures of both phases
    pub fn execute<T, K, V, R, M, F>(
        &self,
        inputs: &[T],
        map_fn: M,
        reduce_fn: F,
    ) -> Result<(HashMap<K, R>, Vec<TaskFailure>), MapReduceError>
    where
        T: Display + Sync,
        K: Eq + Hash + Display + Send,
        V: Send,
        R: Send,
        M: Fn(&T) -> anyhow::Result<KeyValue<K, V>> + Sync + Send,
        F: Fn(&K, &[V]) -> anyhow::Result<R> + Sync + Send,
    {
        self.execute_with(inputs, map_fn, reduce_fn, &self.cancel)
    }

    fn execute_with<T, K, V, R, M, F>(
        &self,
        inputs: &[T],
        map_fn: M,
        reduce_fn: F,
        cancel: &CancelToken,
    ) -> Result<(HashMap<K, R>, Vec<TaskFailure>), MapReduceError>
    where
        T: Display + Sync,
        K: Eq + Hash + Display + Send,
        V: Send,
        R: Send,
        M: Fn(&T) -> anyhow::Result<KeyValue<K, V>> + Sync + Send,
        F: Fn(&K, &[V]) -> anyhow::Result<R> + Sync + Send,
    {
        let mapped = map_all(
            inputs,
            map_fn,
            &self.stage_options(self.config.mappers, cancel),
        )?;
        // The map pool is gone by now, every pair is in
        ensure_not_cancelled(cancel)?;

        let shuffled = group(mapped.pairs);

        let reduced = reduce_all(
            shuffled,
            reduce_fn,
            &self.stage_options(self.config.reducers, cancel),
        )?;
        ensure_not_cancelled(cancel)?;

        let mut failures = mapped.failures;
        failures.extend(reduced.failures);
        Ok((reduced.results, failures))
    }

    /// Like [`Coordinator::run`], but gives up after `timeout`
    ///
    /// On timeout only this run is cancelled; this waits for its pools to drain before
    /// returning [`MapReduceError::Cancelled`] and no partial counts are returned.
    pub async fn run_with_timeout(
        &self,
        text: String,
        allowed: Option<HashSet<String>>,
        timeout: Duration,
    ) -> Result<Frequencies, MapReduceError> {
        let coordinator = self.clone();
        let run_cancel = CancelToken::new();
        let task_cancel = run_cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            coordinator.run_with_token(&text, allowed.as_ref(), &task_cancel)
        });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => joined.map_err(|e| MapReduceError::WorkerPanicked(e.to_string()))?,
            Err(_) => {
                warn!("[MapReduce] Timed out after {:?}, cancelling", timeout);
                run_cancel.cancel();
                // Whatever the blocking task ends with, the caller only sees the cancellation
                let _ = handle.await;
                Err(MapReduceError::Cancelled)
            }
        }
    }
}

fn ensure_not_cancelled(cancel: &CancelToken) -> Result<(), MapReduceError> {
    if cancel.is_cancelled() {
        return Err(MapReduceError::Cancelled);
    }
    Ok(())
}

/// Counts word occurrences of `text` with both pools sized to `concurrency`
///
/// Punctuation is stripped and case is preserved, so `The` and `the` are distinct.
pub fn word_frequencies(
    text: &str,
    allowed: Option<&HashSet<String>>,
    concurrency: Concurrency,
) -> Result<Frequencies, MapReduceError> {
    Coordinator::new(MapReduceConfig::new().with_concurrency(concurrency)).run(text, allowed)
}
