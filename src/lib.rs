//! A word-frequency pipeline built on an in-process MapReduce engine.
//!
//! Text is tokenized, every token is mapped to a `(word, 1)` pair on a worker pool,
//! the pairs are shuffled into per-word groups, and the groups are reduced to counts
//! on a second pool. See [`mr::coordinator::word_frequencies`] for the entry point.

pub mod mr;
pub mod report;
pub mod source;
