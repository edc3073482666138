//! Error types for the cashflow_forecast crate

use forecast_math::MathError;
use thiserror::Error;

/// Custom error types for the cashflow_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Insufficient or malformed input series
    #[error("Data error: {0}")]
    DataError(String),

    /// Forecast requested from a strategy that is not fitted
    #[error("Model not fitted: {0}")]
    NotFitted(String),

    /// Numerical failure inside a strategy (non-convergence, singular system, ...)
    #[error("Model execution error: {0}")]
    ModelExecution(String),

    /// Every ensemble member failed
    #[error("All ensemble members failed: {}", .0.join("; "))]
    AllModelsFailed(Vec<String>),

    /// Configuration or hyperparameters rejected at the boundary
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error while reading CSV input
    #[error("CSV error: {0}")]
    CsvError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<MathError> for ForecastError {
    fn from(err: MathError) -> Self {
        ForecastError::ModelExecution(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::InvalidConfig(err.to_string())
    }
}
