//! blockrank-fusion
//!
//! Pure functions that combine ranked result sets: the four merge strategies
//! (RRF, weighted, concatenate, interleave) and the field-boost rerank.

pub mod merge;
pub mod rerank;

pub use merge::{merge, MergeSpec, MergeStrategy, DEFAULT_RRF_K};
pub use rerank::FieldBoost;
