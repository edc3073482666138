//! # Forecast Math
//!
//! Numerical building blocks for cash-flow forecasting models.
//! This crate knows nothing about dates, merchants or model configuration;
//! it only works on plain `f64` slices.

use thiserror::Error;

pub mod diff;
pub mod linalg;
pub mod optimize;
pub mod regression;
pub mod scale;
pub mod stats;

/// Errors that can occur in numerical routines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numerical operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Returns an error naming `what` unless every value is finite.
pub fn ensure_finite(values: &[f64], what: &str) -> Result<()> {
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(MathError::CalculationError(format!(
            "{} produced a non-finite value at index {}",
            what, pos
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_values_pass() {
        assert!(ensure_finite(&[1.0, -2.0, 0.0], "check").is_ok());
    }

    #[test]
    fn nan_is_reported_with_position() {
        let err = ensure_finite(&[1.0, f64::NAN], "solver").unwrap_err();
        assert_eq!(
            err,
            MathError::CalculationError("solver produced a non-finite value at index 1".to_string())
        );
    }
}
