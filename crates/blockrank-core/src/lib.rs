//! blockrank-core
//!
//! Shared data model for the block pipeline: hits and result sets, the error
//! taxonomy, the backend/store seams, the algorithm description schema, and
//! the configuration loader.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod store;
pub mod traits;
pub mod types;

pub use algorithm::{AlgorithmConfig, BlockConfig};
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use traits::{apply_boost, matches_filters, AlgorithmStore, BackendAdapter, KeywordQuery, VectorQuery, WeightedField};
pub use types::{
    BackendHit, CancelSignal, Canceller, Document, DroppedSource, ExecutionContext, FailurePolicy,
    RequestOverrides, ResultSet, SearchHit,
};
