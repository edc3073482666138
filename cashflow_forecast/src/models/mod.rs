//! Forecasting strategies for cash-flow series
//!
//! Every strategy implements [`PredictorStrategy`]: it is created unfit,
//! fitted once on a [`HistoricalSeries`], and then asked for any number of
//! forecasts. Forecast dates are consecutive calendar days starting the day
//! after the last observation.

use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub mod arima;
pub mod ensemble;
pub mod registry;
#[cfg(feature = "sequence-model")]
pub mod sequence;
#[cfg(feature = "trend-model")]
pub mod trend;

/// One forecast day with its interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point_estimate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    /// Create a point; bounds are widened to contain the estimate.
    pub fn new(date: NaiveDate, point_estimate: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            date,
            point_estimate,
            lower_bound: lower_bound.min(point_estimate),
            upper_bound: upper_bound.max(point_estimate),
        }
    }

    /// Symmetric interval of half-width `margin` around the estimate
    pub fn symmetric(date: NaiveDate, point_estimate: f64, margin: f64) -> Self {
        let margin = margin.abs();
        Self::new(date, point_estimate, point_estimate - margin, point_estimate + margin)
    }

    /// Width of the interval
    pub fn spread(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    pub fn is_finite(&self) -> bool {
        self.point_estimate.is_finite() && self.lower_bound.is_finite() && self.upper_bound.is_finite()
    }
}

/// Lifecycle of a strategy instance.
///
/// `Fit` and `Failed` are terminal: a strategy is fitted at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unfit,
    Fitting,
    Fit,
    Failed,
}

/// Common contract of every forecasting technique
pub trait PredictorStrategy: Debug + Send + Sync {
    /// Name used in logs, ensemble weights and results
    fn name(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> ModelState;

    /// Fewest observations `fit` accepts
    fn min_observations(&self) -> usize;

    /// Estimate the model from a series. Moves the state to `Fit`, or to
    /// `Failed` when estimation fails.
    fn fit(&mut self, series: &HistoricalSeries) -> Result<()>;

    /// Forecast `horizon` days after the last fitted observation
    fn forecast(&self, horizon: usize) -> Result<Vec<ForecastPoint>>;
}

pub type BoxedStrategy = Box<dyn PredictorStrategy>;

/// State bookkeeping shared by the strategies
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lifecycle {
    state: ModelState,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: ModelState::Unfit,
        }
    }

    pub(crate) fn state(&self) -> ModelState {
        self.state
    }

    /// Enter `Fitting`; only an unfit instance may be fitted.
    pub(crate) fn begin(&mut self, name: &str) -> Result<()> {
        match self.state {
            ModelState::Unfit => {
                self.state = ModelState::Fitting;
                Ok(())
            }
            other => Err(ForecastError::ModelExecution(format!(
                "{} cannot be fitted from state {:?}; create a fresh instance",
                name, other
            ))),
        }
    }

    /// Record the outcome of a fit and pass it through
    pub(crate) fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        self.state = if outcome.is_ok() {
            ModelState::Fit
        } else {
            ModelState::Failed
        };
        outcome
    }

    pub(crate) fn ensure_fit(&self, name: &str) -> Result<()> {
        if self.state == ModelState::Fit {
            Ok(())
        } else {
            Err(ForecastError::NotFitted(format!(
                "{} is in state {:?}",
                name, self.state
            )))
        }
    }
}

/// Series length check used at the start of every `fit`
/// Run `task`, turning a panic into a `ModelExecution` error
pub(crate) fn isolate<T>(label: &str, task: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ForecastError::ModelExecution(format!(
                "{} panicked: {}",
                label, message
            )))
        }
    }
}

pub(crate) fn require_length(name: &str, series: &HistoricalSeries, needed: usize) -> Result<()> {
    if series.len() < needed {
        return Err(ForecastError::DataError(format!(
            "{} needs at least {} observations, got {}",
            name,
            needed,
            series.len()
        )));
    }
    Ok(())
}

/// `horizon` consecutive days following `last`
pub fn forecast_dates(last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
    if horizon == 0 {
        return Err(ForecastError::InvalidConfig(
            "Forecast horizon must be at least one day".to_string(),
        ));
    }
    (1..=horizon as u64)
        .map(|offset| {
            last.checked_add_days(Days::new(offset)).ok_or_else(|| {
                ForecastError::DataError(format!("Date overflow {} days after {}", offset, last))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_point_brackets_estimate() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let p = ForecastPoint::new(date, 10.0, 11.0, 12.0);
        assert_eq!(p.lower_bound, 10.0);
        assert!(p.lower_bound <= p.point_estimate && p.point_estimate <= p.upper_bound);

        let s = ForecastPoint::symmetric(date, 5.0, -2.0);
        assert_eq!((s.lower_bound, s.upper_bound), (3.0, 7.0));
        assert_eq!(s.spread(), 4.0);
    }

    #[test]
    fn test_forecast_dates_are_consecutive() {
        let last = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let dates = forecast_dates(last, 3).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            ]
        );
        assert!(forecast_dates(last, 0).is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_fit("m").is_err());
        lifecycle.begin("m").unwrap();
        assert_eq!(lifecycle.state(), ModelState::Fitting);
        let failed: Result<()> = Err(ForecastError::ModelExecution("boom".to_string()));
        assert!(lifecycle.finish(failed).is_err());
        assert_eq!(lifecycle.state(), ModelState::Failed);
        assert!(matches!(lifecycle.ensure_fit("m"), Err(ForecastError::NotFitted(_))));
        assert!(lifecycle.begin("m").is_err());
    }
}
