//! Request-level entry point: validate, build, fit, forecast, evaluate

use crate::config::{ForecastConfig, ForecastMethod};
use crate::data::{HistoricalSeries, TimeRange};
use crate::error::Result;
use crate::metrics::{AccuracyEvaluator, AccuracyMetrics};
use crate::models::ensemble::EnsembleWeights;
use crate::models::registry::StrategyRegistry;
use crate::models::{isolate, BoxedStrategy, ForecastPoint, PredictorStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Provenance of a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// `pred_` followed by eight hex digits
    pub result_id: String,
    pub generated_at: DateTime<Utc>,
    /// The configuration as supplied
    pub config: ForecastConfig,
}

/// Everything produced by one forecast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub merchant_id: String,
    /// Span of the history that was fitted
    pub time_range: TimeRange,
    /// First and last forecast date
    pub prediction_range: TimeRange,
    pub requested_method: ForecastMethod,
    /// Method actually used; differs from the request after a fallback
    pub method: ForecastMethod,
    /// Name of the fitted model, e.g. `ARIMA(1,1,1)`
    pub model_name: String,
    pub points: Vec<ForecastPoint>,
    /// Final member weights of an ensemble forecast
    pub ensemble_weights: Option<EnsembleWeights>,
    /// Ensemble members left out, as `label: error`
    pub excluded_members: Vec<String>,
    pub metrics: Option<AccuracyMetrics>,
    pub metadata: ResultMetadata,
}

/// What a fitted strategy produced for the request horizon
struct Fitted {
    method: ForecastMethod,
    model_name: String,
    points: Vec<ForecastPoint>,
    ensemble_weights: Option<EnsembleWeights>,
    excluded_members: Vec<String>,
}

/// Composes registry, strategies and evaluator into one request cycle.
///
/// Holds no per-request state, so one orchestrator can serve concurrent
/// requests.
#[derive(Debug, Clone, Default)]
pub struct ForecastOrchestrator {
    registry: StrategyRegistry,
    evaluator: AccuracyEvaluator,
}

impl ForecastOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            evaluator: AccuracyEvaluator::new(),
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Produce a forecast for `series` as described by `config`
    pub fn generate(&self, series: &HistoricalSeries, config: &ForecastConfig) -> Result<ForecastResult> {
        config.validate()?;
        info!(
            merchant = series.merchant_id(),
            method = %config.method,
            observations = series.len(),
            horizon = config.horizon_days,
            "forecast requested"
        );

        let fitted = if config.method == ForecastMethod::Ensemble {
            self.run_ensemble(series, config)?
        } else {
            self.run_single(series, config)?
        };

        let metrics = if config.evaluate {
            isolate("backtest", || self.evaluator.evaluate(series, || self.fresh(config)))?
        } else {
            None
        };

        let first = fitted.points.first().map(|p| p.date);
        let last = fitted.points.last().map(|p| p.date);
        let prediction_range = match (first, last) {
            (Some(start), Some(end)) => TimeRange::new(start, end)?,
            _ => series.time_range(),
        };

        let result = ForecastResult {
            merchant_id: series.merchant_id().to_string(),
            time_range: series.time_range(),
            prediction_range,
            requested_method: config.method,
            method: fitted.method,
            model_name: fitted.model_name,
            points: fitted.points,
            ensemble_weights: fitted.ensemble_weights,
            excluded_members: fitted.excluded_members,
            metrics,
            metadata: ResultMetadata {
                result_id: format!("pred_{:08x}", rand::random::<u32>()),
                generated_at: Utc::now(),
                config: config.clone(),
            },
        };
        info!(
            result_id = %result.metadata.result_id,
            method = %result.method,
            points = result.points.len(),
            "forecast generated"
        );
        Ok(result)
    }

    fn fresh(&self, config: &ForecastConfig) -> Result<BoxedStrategy> {
        self.registry.create(config).map(|(_, strategy)| strategy)
    }

    fn run_single(&self, series: &HistoricalSeries, config: &ForecastConfig) -> Result<Fitted> {
        let (method, mut strategy) = self.registry.create(config)?;
        let label = strategy.name().to_string();
        isolate(&label, || strategy.fit(series))?;
        let points = isolate(&label, || strategy.forecast(config.horizon_days))?;
        Ok(Fitted {
            method,
            model_name: strategy.name().to_string(),
            points,
            ensemble_weights: None,
            excluded_members: Vec::new(),
        })
    }

    fn run_ensemble(&self, series: &HistoricalSeries, config: &ForecastConfig) -> Result<Fitted> {
        let mut ensemble = self.registry.create_ensemble(config)?;
        ensemble.fit(series)?;
        let forecast = ensemble.forecast_detailed(config.horizon_days)?;
        let mut excluded_members = ensemble.fit_failures().to_vec();
        excluded_members.extend(forecast.failures);
        Ok(Fitted {
            method: ForecastMethod::Ensemble,
            model_name: ensemble.name().to_string(),
            points: forecast.points,
            ensemble_weights: Some(forecast.weights),
            excluded_members,
        })
    }
}
