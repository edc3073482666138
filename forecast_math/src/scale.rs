//! Min-max scaling to the unit interval

use crate::{MathError, Result};

/// Maps values linearly from `[min, max]` onto `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    range: f64,
}

impl MinMaxScaler {
    /// Learn the scaling from a sample.
    ///
    /// A constant sample gets a unit range so that transforming it is still
    /// well defined.
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(MathError::InsufficientData(
                "Cannot fit a scaler on an empty sample".to_string(),
            ));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min.is_finite() || !max.is_finite() {
            return Err(MathError::InvalidInput(
                "Cannot scale non-finite values".to_string(),
            ));
        }
        let range = if max - min > 1e-12 { max - min } else { 1.0 };
        Ok(Self { min, range })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_interval() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 15.0]).unwrap();
        assert_eq!(scaler.transform_all(&[10.0, 20.0, 15.0]), vec![0.0, 1.0, 0.5]);
        assert_relative_eq!(scaler.inverse(0.25), 12.5);
    }

    #[test]
    fn test_constant_sample() {
        let scaler = MinMaxScaler::fit(&[7.0, 7.0]).unwrap();
        assert_relative_eq!(scaler.transform(7.0), 0.0);
        assert_relative_eq!(scaler.inverse(0.5), 7.5);
    }

    #[test]
    fn test_empty_sample() {
        assert!(MinMaxScaler::fit(&[]).is_err());
    }
}
