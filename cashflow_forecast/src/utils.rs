//! Utility functions for the cashflow_forecast crate

use crate::error::{ForecastError, Result};
use crate::metrics::AccuracyMetrics;

/// Floor applied to denominators that may be zero
pub const EPSILON: f64 = 1e-10;

/// Longest holdout window used for backtesting
pub const MAX_HOLDOUT: usize = 30;

/// Share of the series held out for backtesting
pub const HOLDOUT_RATIO: f64 = 0.2;

/// Size of the backtest window for a series of `len` points:
/// `min(30, round(0.2 * len))`
pub fn holdout_size(len: usize) -> usize {
    ((len as f64 * HOLDOUT_RATIO).round() as usize).min(MAX_HOLDOUT)
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<AccuracyMetrics> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::DataError(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }

    let n = forecast.len() as f64;

    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(&f, &a)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let rmse = (errors.iter().map(|e| e.powi(2)).sum::<f64>() / n).sqrt();

    let mape = actual
        .iter()
        .zip(errors.iter())
        .map(|(&a, &e)| e.abs() / a.abs().max(EPSILON))
        .sum::<f64>()
        / n
        * 100.0;

    let mean_actual = actual.iter().sum::<f64>() / n;
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let r2 = 1.0 - ss_res / ss_tot.max(EPSILON);

    Ok(AccuracyMetrics {
        mape,
        rmse,
        mae,
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(40, 8)]
    #[case(10, 2)]
    #[case(2, 0)]
    #[case(3, 1)]
    #[case(150, 30)]
    #[case(1000, 30)]
    fn test_holdout_size(#[case] len: usize, #[case] expected: usize) {
        assert_eq!(holdout_size(len), expected);
    }

    #[test]
    fn test_perfect_forecast() {
        let m = forecast_accuracy(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mape, 0.0);
        assert_relative_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_known_errors() {
        let m = forecast_accuracy(&[110.0, 90.0], &[100.0, 100.0]).unwrap();
        assert_relative_eq!(m.mae, 10.0);
        assert_relative_eq!(m.rmse, 10.0);
        assert_relative_eq!(m.mape, 10.0);
        // constant actuals: SS_tot is floored, so R² is hugely negative
        assert!(m.r2 < 0.0);
    }

    #[test]
    fn test_zero_actual_does_not_divide_by_zero() {
        let m = forecast_accuracy(&[1.0], &[0.0]).unwrap();
        assert!(m.mape.is_finite());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(forecast_accuracy(&[1.0], &[1.0, 2.0]).is_err());
        assert!(forecast_accuracy(&[], &[]).is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-0.98765, 4), -0.9877);
    }
}
