//! Summary statistics used by the forecasting models
//!
//! Contains:
//! - Mean, variance and standard deviation
//! - Percentiles with linear interpolation
//! - Lagged autocorrelation
//! - Standard normal quantiles
//! - The Dickey–Fuller unit-root statistic

use crate::diff::difference;
use crate::regression::LinearRegression;
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by `n`).
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Descriptive statistics of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// Summarise a non-empty sample
    pub fn of(values: &[f64]) -> Result<Self> {
        let mean = mean(values).ok_or_else(|| {
            MathError::InsufficientData("Cannot summarise an empty sample".to_string())
        })?;
        let std_dev = std_dev(values).unwrap_or(0.0);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            count: values.len(),
            mean,
            std_dev,
            min,
            max,
        })
    }
}

/// Percentile `q` (0..=100) of an unsorted sample, interpolating linearly
/// between the closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take a percentile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(MathError::InvalidInput(format!(
            "Percentile must be within 0..=100, got {}",
            q
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Pearson correlation between the series and itself shifted by `lag`.
///
/// Returns `None` when either overlapping segment has zero variance.
pub fn autocorrelation(values: &[f64], lag: usize) -> Result<Option<f64>> {
    if lag == 0 || values.len() < lag + 2 {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} values for a lag-{} autocorrelation, have {}",
            lag + 2,
            lag,
            values.len()
        )));
    }

    let head = &values[..values.len() - lag];
    let tail = &values[lag..];
    let (mh, mt) = match (mean(head), mean(tail)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };

    let mut cov = 0.0;
    let mut var_h = 0.0;
    let mut var_t = 0.0;
    for (h, t) in head.iter().zip(tail) {
        cov += (h - mh) * (t - mt);
        var_h += (h - mh).powi(2);
        var_t += (t - mt).powi(2);
    }

    let denom = (var_h * var_t).sqrt();
    if denom < 1e-12 {
        return Ok(None);
    }
    Ok(Some(cov / denom))
}

/// Two-sided standard normal critical value for a confidence level,
/// i.e. `Φ⁻¹((1 + level) / 2)`.
pub fn normal_critical_value(level: f64) -> Result<f64> {
    if level <= 0.0 || level >= 1.0 {
        return Err(MathError::InvalidInput(
            "Confidence level must be between 0 and 1".to_string(),
        ));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| MathError::CalculationError(format!("Standard normal: {}", e)))?;
    Ok(normal.inverse_cdf((1.0 + level) / 2.0))
}

/// 5% critical value of the Dickey–Fuller test with a constant
pub const DICKEY_FULLER_5_PERCENT: f64 = -2.86;

/// Dickey–Fuller statistic: the t-ratio of `γ` in `Δy_t = α + γ·y_{t-1} + e_t`.
///
/// Values below [`DICKEY_FULLER_5_PERCENT`] reject a unit root. A constant
/// series has no unit root and yields `-∞`.
pub fn dickey_fuller(values: &[f64]) -> Result<f64> {
    if values.len() < 4 {
        return Err(MathError::InsufficientData(format!(
            "Need at least 4 values for a Dickey-Fuller test, have {}",
            values.len()
        )));
    }
    let lagged = &values[..values.len() - 1];
    let first = lagged[0];
    if lagged.iter().all(|v| (v - first).abs() < 1e-12) {
        return Ok(f64::NEG_INFINITY);
    }
    let changes = difference(values, 1);
    Ok(LinearRegression::fit_xy(lagged, &changes)?.t_statistic())
}

/// Whether the series passes the Dickey–Fuller test at the 5% level
pub fn is_stationary(values: &[f64]) -> Result<bool> {
    Ok(dickey_fuller(values)? < DICKEY_FULLER_5_PERCENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values).unwrap(), 5.0);
        assert_relative_eq!(variance(&values).unwrap(), 4.0);
        assert_relative_eq!(std_dev(&values).unwrap(), 2.0);
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_summary() {
        let summary = Summary::of(&[3.0, 1.0, 2.0]).unwrap();
        assert_eq!(summary.count, 3);
        assert_relative_eq!(summary.min, 1.0);
        assert_relative_eq!(summary.max, 3.0);
        assert!(Summary::of(&[]).is_err());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&values, 50.0).unwrap(), 3.0);
        assert_relative_eq!(percentile(&values, 100.0).unwrap(), 5.0);
        assert_relative_eq!(percentile(&values, 2.5).unwrap(), 1.1);
        assert!(percentile(&values, 101.0).is_err());
        assert!(percentile(&[], 50.0).is_err());
    }

    #[test]
    fn test_autocorrelation_of_weekly_pattern() {
        let values: Vec<f64> = (0..28).map(|i| [1.0, 5.0, 2.0, 8.0, 3.0, 9.0, 4.0][i % 7]).collect();
        let acf = autocorrelation(&values, 7).unwrap().unwrap();
        assert_relative_eq!(acf, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_autocorrelation_constant_is_none() {
        let values = vec![3.0; 20];
        assert_eq!(autocorrelation(&values, 7).unwrap(), None);
        assert!(autocorrelation(&values[..5], 7).is_err());
    }

    #[test]
    fn test_dickey_fuller() {
        let noise: Vec<f64> = (0..120).map(|i| ((i * 7919) % 13) as f64 - 6.0).collect();
        assert!(is_stationary(&noise).unwrap());

        let mut level = 0.0;
        let walk: Vec<f64> = noise
            .iter()
            .map(|e| {
                level += e + 1.0;
                level
            })
            .collect();
        assert!(!is_stationary(&walk).unwrap());

        assert_eq!(dickey_fuller(&[4.0; 10]).unwrap(), f64::NEG_INFINITY);
        assert!(dickey_fuller(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_normal_critical_value() {
        assert_relative_eq!(normal_critical_value(0.95).unwrap(), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(normal_critical_value(0.5).unwrap(), 0.674490, epsilon = 1e-5);
        assert!(normal_critical_value(1.0).is_err());
    }
}
