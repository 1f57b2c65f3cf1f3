//! Error types for the reliability engine
//!
//! Only configuration and programming errors are reported through
//! [`ReliabilityError`]. Failed model evaluations travel as NaN and
//! non-convergence is reported through the convergence report.

use thiserror::Error;

/// Errors that abort a calculation before or while it is set up
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReliabilityError {
    /// Two collections that must have the same length differ
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A single index lies outside a collection of the right length
    #[error("Index {index} out of range for size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Correlation matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid combination: {0}")]
    InvalidCombination(String),

    #[error("No varying stochasts in model")]
    NoVaryingStochasts,

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, ReliabilityError>;
