//! blockrank-vector
//!
//! Exact k-nearest-neighbour search over dense vectors stored alongside their
//! documents, persisted as JSON.
pub mod similarity;
pub mod store;

pub use similarity::Similarity;
pub use store::{VectorRecord, VectorStore};
