//! Descriptive profile of a merchant's cash-flow history

use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use crate::utils::round_to;
use forecast_math::regression::LinearRegression;
use forecast_math::stats::{autocorrelation, Summary};
use serde::{Deserialize, Serialize};

/// Weekly lag used for the seasonality measures
const WEEKLY_LAG: usize = 7;

/// Shortest series for which weekly seasonality is measured
const SEASONALITY_MIN_POINTS: usize = 14;

/// Summary characteristics of a cash-flow series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowProfile {
    pub merchant_id: String,
    /// Mean daily value, 2 decimals
    pub avg_daily_cash: f64,
    /// Coefficient of variation
    pub volatility: f64,
    /// Least-squares slope per day relative to the mean
    pub trend_coefficient: f64,
    /// Lag-7 autocorrelation, when the series is long enough
    pub weekly_autocorrelation: Option<f64>,
    /// `max(0, weekly_autocorrelation)`
    pub seasonality_strength: Option<f64>,
}

impl CashflowProfile {
    pub fn from_series(series: &HistoricalSeries) -> Result<Self> {
        let values = series.values();
        let summary = Summary::of(&values)?;
        if summary.mean.abs() < f64::EPSILON {
            return Err(ForecastError::DataError(
                "Cannot profile a series whose mean is zero".to_string(),
            ));
        }

        let regression = LinearRegression::fit(&values)?;

        let weekly_autocorrelation = if values.len() >= SEASONALITY_MIN_POINTS {
            autocorrelation(&values, WEEKLY_LAG)?.map(|acf| round_to(acf, 4))
        } else {
            None
        };

        Ok(Self {
            merchant_id: series.merchant_id().to_string(),
            avg_daily_cash: round_to(summary.mean, 2),
            volatility: round_to(summary.std_dev / summary.mean, 4),
            trend_coefficient: round_to(regression.slope() / summary.mean, 4),
            weekly_autocorrelation,
            seasonality_strength: weekly_autocorrelation.map(|acf| acf.max(0.0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeSeriesPoint;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> HistoricalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| TimeSeriesPoint::new(start + chrono::Duration::days(i as i64), v))
            .collect();
        HistoricalSeries::prepare("m-9", points).unwrap()
    }

    #[test]
    fn test_weekly_pattern() {
        let week = [100.0, 120.0, 90.0, 110.0, 150.0, 60.0, 70.0];
        let values: Vec<f64> = week.iter().cycle().take(28).copied().collect();
        let profile = CashflowProfile::from_series(&series(&values)).unwrap();

        assert_relative_eq!(profile.avg_daily_cash, 100.0);
        assert_relative_eq!(profile.weekly_autocorrelation.unwrap(), 1.0);
        assert_eq!(profile.seasonality_strength, Some(1.0));
        assert_eq!(profile.merchant_id, "m-9");
    }

    #[test]
    fn test_short_series_has_no_seasonality() {
        let profile = CashflowProfile::from_series(&series(&[10.0, 12.0, 14.0])).unwrap();
        assert_eq!(profile.weekly_autocorrelation, None);
        assert!(profile.trend_coefficient > 0.0);
    }

    #[test]
    fn test_zero_mean_rejected() {
        assert!(matches!(
            CashflowProfile::from_series(&series(&[-5.0, 5.0])),
            Err(ForecastError::DataError(_))
        ));
    }
}
