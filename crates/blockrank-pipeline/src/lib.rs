//! blockrank-pipeline
//!
//! Compiles declarative algorithm descriptions into staged execution plans and
//! runs them: generation stages fan out concurrently to the backend, merge and
//! rerank stages fuse the collected result sets.

pub mod blocks;
pub mod cache;
pub mod compiler;
pub mod engine;
pub mod plan;
pub mod registry;

pub use blocks::{Block, BlockRole, GenerationBlock, KeywordSearchBlock, MergeBlock, RerankBlock, VectorSearchBlock};
pub use cache::AlgorithmCache;
pub use compiler::{compile, compile_json, CompiledAlgorithm};
pub use engine::{BlockTiming, ComparisonEntry, ExecutionOutput, Executor};
pub use plan::{ExecutionPlan, FinalOutput, RerankInput, Stage};
