//! Errors raised by the estimators.

use thiserror::Error;

/// Result type for model estimation.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur during estimation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Insufficient data for estimation
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// The design matrix is rank deficient
    #[error("Singular matrix: regressors are collinear")]
    Singular,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
