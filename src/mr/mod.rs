pub mod config;
pub mod coordinator;
pub mod error;
pub mod function;
pub mod map;
pub mod reduce;
pub mod shuffle;
pub mod tokenizer;
pub mod worker;

pub use config::{Concurrency, FailurePolicy, MapReduceConfig};
pub use coordinator::{word_frequencies, Coordinator, Frequencies};
pub use error::{MapReduceError, TaskFailure};
pub use worker::{CancelToken, KeyValue};
