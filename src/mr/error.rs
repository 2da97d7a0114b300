//! Error types for the MapReduce engine

use serde::Serialize;
use thiserror::Error;

/// Pipeline-level failures, the run either never starts or yields nothing
#[derive(Debug, Error)]
pub enum MapReduceError {
    /// The text source could not be read, the pipeline was never invoked
    #[error("Input unavailable: {0}")]
    InputUnavailable(String),

    #[error("Invalid concurrency `{0}`, expected a positive integer or `unbounded`")]
    InvalidConcurrency(String),

    #[error("Failed to build {stage} worker pool: {source}")]
    PoolBuild {
        stage: &'static str,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    /// The run was aborted before completing, outstanding tasks were discarded
    #[error("MapReduce run was cancelled")]
    Cancelled,

    /// Only produced under the strict failure policy
    #[error("Task failed: {0}")]
    TaskFailed(TaskFailure),

    #[error("Pipeline worker panicked: {0}")]
    WorkerPanicked(String),
}

/// A single map or reduce task that did not produce a result
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum TaskFailure {
    #[error("map task #{index} (`{token}`) failed: {reason}")]
    Map {
        index: usize,
        token: String,
        reason: String,
    },

    #[error("reduce task for key `{key}` failed: {reason}")]
    Reduce { key: String, reason: String },
}

impl TaskFailure {
    /// The key (or token) the failed task was working on
    pub fn subject(&self) -> &str {
        match self {
            TaskFailure::Map { token, .. } => token,
            TaskFailure::Reduce { key, .. } => key,
        }
    }
}

/// Renders a caught panic payload as text
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
