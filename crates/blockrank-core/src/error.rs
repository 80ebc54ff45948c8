use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Every failure the pipeline can surface.
///
/// The first three variants are raised while compiling an algorithm and never
/// at request time; the next three are request-time failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid algorithm configuration: {0}")]
    ConfigValidation(String),

    #[error("Invalid merge configuration: {0}")]
    Merge(String),

    #[error("Invalid pipeline order: {0}")]
    PipelineOrder(String),

    #[error("Backend call failed: {0}")]
    BackendCall(String),

    #[error("Block '{block}' requires a query vector but none was provided")]
    MissingQueryVector { block: String },

    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Taxonomy kind of an [`Error`], rendered with its public name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigValidationError,
    MergeError,
    PipelineOrderError,
    BackendCallError,
    MissingQueryVectorError,
    CancelledError,
    NotFoundError,
    AlreadyExistsError,
    OperationError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConfigValidationError => "ConfigValidationError",
            Self::MergeError => "MergeError",
            Self::PipelineOrderError => "PipelineOrderError",
            Self::BackendCallError => "BackendCallError",
            Self::MissingQueryVectorError => "MissingQueryVectorError",
            Self::CancelledError => "CancelledError",
            Self::NotFoundError => "NotFoundError",
            Self::AlreadyExistsError => "AlreadyExistsError",
            Self::OperationError => "OperationError",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigValidation(_) => ErrorKind::ConfigValidationError,
            Self::Merge(_) => ErrorKind::MergeError,
            Self::PipelineOrder(_) => ErrorKind::PipelineOrderError,
            Self::BackendCall(_) => ErrorKind::BackendCallError,
            Self::MissingQueryVector { .. } => ErrorKind::MissingQueryVectorError,
            Self::Cancelled(_) => ErrorKind::CancelledError,
            Self::NotFound(_) => ErrorKind::NotFoundError,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExistsError,
            Self::Operation(_) => ErrorKind::OperationError,
        }
    }

    /// True for defects in the algorithm description itself. These make the
    /// algorithm unusable until it is fixed.
    pub fn is_compile_time(&self) -> bool {
        matches!(self, Self::ConfigValidation(_) | Self::Merge(_) | Self::PipelineOrder(_))
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport { kind: self.kind(), message: self.to_string() }
    }
}

/// Structured form of an error handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        err.report()
    }
}
