//! Tunables for a MapReduce run

use std::{fmt, num::NonZeroUsize, str::FromStr};

use crate::mr::error::MapReduceError;

/// How many workers a pool may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// At most this many workers
    Bounded(NonZeroUsize),
    /// Let the pool size itself to the host's available parallelism
    #[default]
    Unbounded,
}

impl Concurrency {
    /// A bounded pool of `n` workers, `None` if `n` is zero
    pub fn bounded(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(Concurrency::Bounded)
    }

    /// Single worker, every task runs one after another
    pub fn serial() -> Self {
        Concurrency::Bounded(NonZeroUsize::MIN)
    }

    /// The thread count handed to the pool builder, `0` lets rayon decide
    pub(crate) fn num_threads(&self) -> usize {
        match self {
            Concurrency::Bounded(n) => n.get(),
            Concurrency::Unbounded => 0,
        }
    }
}

impl FromStr for Concurrency {
    type Err = MapReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unbounded") || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Concurrency::Unbounded);
        }
        trimmed
            .parse::<usize>()
            .ok()
            .and_then(Concurrency::bounded)
            .ok_or_else(|| MapReduceError::InvalidConcurrency(s.to_string()))
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Bounded(n) => write!(f, "{}", n),
            Concurrency::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// What a stage does when one of its tasks fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the failed task's contribution, report it, keep going
    #[default]
    BestEffort,
    /// Abort the stage on the first failure
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapReduceConfig {
    /// Worker count of the map pool
    pub mappers: Concurrency,
    /// Worker count of the reduce pool
    pub reducers: Concurrency,
    pub failure_policy: FailurePolicy,
    /// Lowercase tokens before filtering and counting, so `The` and `the` collapse
    pub case_fold: bool,
}

impl MapReduceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both pools to the same size
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.mappers = concurrency;
        self.reducers = concurrency;
        self
    }

    pub fn with_mappers(mut self, mappers: Concurrency) -> Self {
        self.mappers = mappers;
        self
    }

    pub fn with_reducers(mut self, reducers: Concurrency) -> Self {
        self.reducers = reducers;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_case_fold(mut self, case_fold: bool) -> Self {
        self.case_fold = case_fold;
        self
    }
}
