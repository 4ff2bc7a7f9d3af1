//! Error types for characteristic and portfolio computations.

use thiserror::Error;

/// Result type for factor operations.
pub type Result<T> = std::result::Result<T, FactorError>;

/// Errors raised while computing characteristics or portfolios.
#[derive(Debug, Error)]
pub enum FactorError {
    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Error from the data layer
    #[error(transparent)]
    Data(#[from] tidyfin_data::DataError),

    /// A required column is absent
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Not enough observations to compute a result
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
