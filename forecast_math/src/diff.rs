//! Differencing and integration of series
//!
//! Regular differencing uses lag 1, seasonal differencing uses the seasonal
//! period as lag. Stages are applied in order and undone in reverse order.

use crate::{MathError, Result};

/// `values[t] - values[t - lag]` for every `t >= lag`
pub fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 || values.len() <= lag {
        return Vec::new();
    }
    values
        .iter()
        .skip(lag)
        .zip(values.iter())
        .map(|(now, before)| now - before)
        .collect()
}

/// Undo one differencing stage: extend `history` with the cumulated `diffs`
/// and return only the new values.
pub fn integrate(diffs: &[f64], history: &[f64], lag: usize) -> Vec<f64> {
    let mut extended = history.to_vec();
    for &d in diffs {
        let base = extended[extended.len() - lag];
        extended.push(base + d);
    }
    extended.split_off(history.len())
}

/// Coefficients of `Π (1 - B^lag)` in ascending powers of the backshift `B`
pub fn lag_polynomial(lags: &[usize]) -> Vec<f64> {
    let mut poly = vec![1.0];
    for &lag in lags {
        let mut next = vec![0.0; poly.len() + lag];
        for (i, &c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + lag] -= c;
        }
        poly = next;
    }
    poly
}

/// Whether `y_t = Σ phi[i] y_{t-1-i} + e_t` is stationary, i.e. every root
/// of `1 - Σ phi[i] B^(i+1)` lies outside the unit circle.
///
/// Uses the Levinson step-down recursion: the process is stationary exactly
/// when every partial autocorrelation it produces is below one in magnitude.
pub fn ar_is_stationary(phi: &[f64]) -> bool {
    let mut coefficients = phi.to_vec();
    while let Some(&last) = coefficients.last() {
        if !last.is_finite() || last.abs() >= 1.0 {
            return false;
        }
        let m = coefficients.len();
        let denom = 1.0 - last * last;
        coefficients = (0..m - 1)
            .map(|j| (coefficients[j] + last * coefficients[m - 2 - j]) / denom)
            .collect();
    }
    true
}

/// A series together with every intermediate differencing level
#[derive(Debug, Clone)]
pub struct Differenced {
    lags: Vec<usize>,
    levels: Vec<Vec<f64>>,
}

impl Differenced {
    /// Apply `d` regular and `seasonal_d` seasonal differences
    pub fn new(values: &[f64], d: usize, seasonal_d: usize, period: usize) -> Result<Self> {
        if seasonal_d > 0 && period < 2 {
            return Err(MathError::InvalidInput(
                "Seasonal differencing needs a period of at least 2".to_string(),
            ));
        }

        let lags: Vec<usize> = std::iter::repeat(1)
            .take(d)
            .chain(std::iter::repeat(period).take(seasonal_d))
            .collect();

        let mut levels = vec![values.to_vec()];
        for &lag in &lags {
            let next = difference(levels.last().map(Vec::as_slice).unwrap_or(&[]), lag);
            if next.is_empty() {
                return Err(MathError::InsufficientData(format!(
                    "Series of length {} is too short for the requested differencing",
                    values.len()
                )));
            }
            levels.push(next);
        }

        Ok(Self { lags, levels })
    }

    /// The fully differenced series
    pub fn series(&self) -> &[f64] {
        self.levels.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lags of the applied stages, in application order
    pub fn lags(&self) -> &[usize] {
        &self.lags
    }

    /// Map values on the differenced scale back to the original scale
    pub fn integrate(&self, forecast: &[f64]) -> Vec<f64> {
        let mut current = forecast.to_vec();
        for (lag, history) in self.lags.iter().zip(&self.levels).rev() {
            current = integrate(&current, history, *lag);
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_difference_and_integrate_roundtrip() {
        let values = [1.0, 4.0, 9.0, 16.0, 25.0];
        let diffed = Differenced::new(&values, 2, 0, 0).unwrap();
        assert_eq!(diffed.series(), &[2.0, 2.0, 2.0]);

        let future = diffed.integrate(&[2.0, 2.0]);
        assert_relative_eq!(future[0], 36.0);
        assert_relative_eq!(future[1], 49.0);
    }

    #[test]
    fn test_seasonal_difference() {
        let values: Vec<f64> = (0..14).map(|i| (i % 7) as f64 + 10.0).collect();
        let diffed = Differenced::new(&values, 0, 1, 7).unwrap();
        assert!(diffed.series().iter().all(|v| v.abs() < 1e-12));
        let future = diffed.integrate(&[0.0; 3]);
        assert_eq!(future, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_lag_polynomial() {
        assert_eq!(lag_polynomial(&[1]), vec![1.0, -1.0]);
        assert_eq!(lag_polynomial(&[1, 1]), vec![1.0, -2.0, 1.0]);
        assert_eq!(lag_polynomial(&[2]), vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_ar_stationarity() {
        assert!(ar_is_stationary(&[]));
        assert!(ar_is_stationary(&[0.9]));
        assert!(!ar_is_stationary(&[1.0]));
        // φ1 + φ2 < 1, φ2 - φ1 < 1, |φ2| < 1
        assert!(ar_is_stationary(&[0.5, 0.3]));
        assert!(!ar_is_stationary(&[0.9, 0.5]));
        assert!(!ar_is_stationary(&[-0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 1.2]));
    }

    #[test]
    fn test_too_short() {
        assert!(Differenced::new(&[1.0], 1, 0, 0).is_err());
        assert!(Differenced::new(&[1.0, 2.0, 3.0], 0, 1, 1).is_err());
    }
}
