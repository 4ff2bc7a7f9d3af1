//! Errors raised by the workflows.

use thiserror::Error;

/// Result type for workflows.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a workflow.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Data layer error
    #[error(transparent)]
    Data(#[from] tidyfin_data::DataError),

    /// Characteristic or portfolio error
    #[error(transparent)]
    Factor(#[from] tidyfin_factors::FactorError),

    /// Estimation error
    #[error(transparent)]
    Model(#[from] tidyfin_models::ModelError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A table a workflow reads has not been created yet
    #[error("Table {table} not found; {hint}")]
    MissingTable {
        /// Table name
        table: String,
        /// Command that creates it
        hint: &'static str,
    },

    /// Unknown sorting variable
    #[error("Unknown sorting variable: {0}")]
    UnknownVariable(String),

    /// A workflow produced no usable observations
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}
