//! Metrics for evaluating forecast performance

use crate::data::HistoricalSeries;
use crate::error::Result;
use crate::models::BoxedStrategy;
use crate::utils::{forecast_accuracy, holdout_size};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Holdout accuracy of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean Absolute Percentage Error, in percent
    pub mape: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Coefficient of determination, at most 1
    pub r2: f64,
}

impl std::fmt::Display for AccuracyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAPE:  {:.4}%", self.mape)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  R²:    {:.4}", self.r2)?;
        Ok(())
    }
}

/// Holdout backtesting of a strategy on the tail of a series
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyEvaluator;

impl AccuracyEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Number of trailing points held out for a series of `len` points
    pub fn test_window(&self, len: usize) -> usize {
        holdout_size(len)
    }

    /// Fit a fresh strategy from `factory` on everything but the test window
    /// and score its forecast of the window.
    ///
    /// Returns `Ok(None)` when there is nothing to evaluate: an empty test
    /// window, or a training head that is empty or shorter than the
    /// strategy accepts.
    pub fn evaluate<F>(&self, series: &HistoricalSeries, factory: F) -> Result<Option<AccuracyMetrics>>
    where
        F: FnOnce() -> Result<BoxedStrategy>,
    {
        let window = self.test_window(series.len());
        if window == 0 {
            warn!(observations = series.len(), "series too short for a test window; skipping evaluation");
            return Ok(None);
        }

        let (head, test) = series.split_tail(window);
        let Some(head) = head else {
            warn!(window, "no training data left after the split; skipping evaluation");
            return Ok(None);
        };

        let mut strategy = factory()?;
        if head.len() < strategy.min_observations() {
            warn!(
                model = strategy.name(),
                training = head.len(),
                needed = strategy.min_observations(),
                "training portion too short for the strategy; skipping evaluation"
            );
            return Ok(None);
        }

        strategy.fit(&head)?;
        let predicted: Vec<f64> = strategy
            .forecast(window)?
            .iter()
            .map(|p| p.point_estimate)
            .collect();
        let actual: Vec<f64> = test.iter().map(|p| p.value()).collect();

        let metrics = forecast_accuracy(&predicted, &actual)?;
        info!(
            model = strategy.name(),
            window,
            mape = metrics.mape,
            rmse = metrics.rmse,
            "holdout evaluation finished"
        );
        Ok(Some(metrics))
    }
}
