//! Ordinary least-squares line

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Least-squares fit of `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    slope: f64,
    /// Standard error of the slope; infinite with fewer than three points
    slope_std_error: f64,
}

impl LinearRegression {
    /// Fit a line to equally spaced values, using the index (0, 1, 2, ...) as `x`
    pub fn fit(values: &[f64]) -> Result<Self> {
        let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        Self::fit_xy(&index, values)
    }

    /// Fit a line through the `(x[i], y[i])` pairs
    pub fn fit_xy(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(MathError::InvalidInput(format!(
                "x and y differ in length: {} vs {}",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(MathError::InsufficientData(
                "Not enough data for linear regression. Need at least 2 points.".to_string(),
            ));
        }

        let n = x.len() as f64;
        let x_mean = x.iter().sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (&xi, &yi) in x.iter().zip(y) {
            sxy += (xi - x_mean) * (yi - y_mean);
            sxx += (xi - x_mean) * (xi - x_mean);
        }
        if sxx <= 0.0 {
            return Err(MathError::InvalidInput(
                "x has no spread; the slope is undefined".to_string(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let sse: f64 = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| (yi - intercept - slope * xi).powi(2))
            .sum();
        let slope_std_error = if x.len() > 2 {
            (sse / (n - 2.0) / sxx).sqrt()
        } else {
            f64::INFINITY
        };

        Ok(Self {
            slope,
            slope_std_error,
        })
    }

    /// Get the slope (change per unit of `x`)
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn slope_std_error(&self) -> f64 {
        self.slope_std_error
    }

    /// `slope / se(slope)`; an exact fit gives ±∞, or 0 for a zero slope
    pub fn t_statistic(&self) -> f64 {
        if self.slope_std_error > 0.0 {
            self.slope / self.slope_std_error
        } else if self.slope == 0.0 {
            0.0
        } else {
            self.slope.signum() * f64::INFINITY
        }
    }
}
