//! Strategy construction keyed by forecast method
//!
//! The autoregressive model is always available and doubles as the fallback
//! for any method the registry cannot build, for instance when the crate is
//! compiled without the `trend-model` or `sequence-model` feature.

use crate::config::{ArimaParams, EnsembleParams, ForecastConfig, ForecastMethod, StrategyParams};
use crate::error::{ForecastError, Result};
use crate::models::arima::ArimaModel;
use crate::models::ensemble::EnsembleCoordinator;
use crate::models::BoxedStrategy;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Builds an unfit strategy from a validated configuration
pub type Constructor = fn(&ForecastConfig) -> Result<BoxedStrategy>;

fn build_arima(config: &ForecastConfig) -> Result<BoxedStrategy> {
    match StrategyParams::from_config(config)? {
        StrategyParams::Autoregressive(params) => {
            Ok(Box::new(ArimaModel::new(params, config.confidence_level)))
        }
        other => Err(mismatch(config.method, &other)),
    }
}

#[cfg(feature = "trend-model")]
fn build_trend(config: &ForecastConfig) -> Result<BoxedStrategy> {
    use crate::models::trend::TrendModel;
    match StrategyParams::from_config(config)? {
        StrategyParams::TrendDecomposition(params) => Ok(Box::new(
            TrendModel::new(params, config.confidence_level)
                .with_seasonality_mode(config.seasonality_mode)
                .with_holidays(config.include_holidays)
                .with_weekday_patterns(config.use_weekday_patterns),
        )),
        other => Err(mismatch(config.method, &other)),
    }
}

#[cfg(feature = "sequence-model")]
fn build_sequence(config: &ForecastConfig) -> Result<BoxedStrategy> {
    use crate::models::sequence::SequenceModel;
    match StrategyParams::from_config(config)? {
        StrategyParams::SequenceLearning(params) => {
            Ok(Box::new(SequenceModel::new(params, config.confidence_level)))
        }
        other => Err(mismatch(config.method, &other)),
    }
}

fn mismatch(method: ForecastMethod, params: &StrategyParams) -> ForecastError {
    ForecastError::InvalidConfig(format!(
        "Constructor for {} received parameters {:?}",
        method, params
    ))
}

/// The fallback: an autoregressive model with default orders
fn fallback(config: &ForecastConfig) -> BoxedStrategy {
    Box::new(ArimaModel::new(ArimaParams::default(), config.confidence_level))
}

/// Method -> constructor table
#[derive(Clone)]
pub struct StrategyRegistry {
    constructors: BTreeMap<ForecastMethod, Constructor>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("methods", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut constructors: BTreeMap<ForecastMethod, Constructor> = BTreeMap::new();
        constructors.insert(ForecastMethod::Autoregressive, build_arima);
        #[cfg(feature = "trend-model")]
        constructors.insert(ForecastMethod::TrendDecomposition, build_trend);
        #[cfg(feature = "sequence-model")]
        constructors.insert(ForecastMethod::SequenceLearning, build_sequence);
        Self { constructors }
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `method` removed, as if its backend were missing
    pub fn without(mut self, method: ForecastMethod) -> Self {
        self.constructors.remove(&method);
        self
    }

    /// Register or replace the constructor for a single method
    pub fn register(&mut self, method: ForecastMethod, constructor: Constructor) -> Result<()> {
        if method == ForecastMethod::Ensemble {
            return Err(ForecastError::InvalidConfig(
                "The ensemble is assembled from registered methods and cannot be registered"
                    .to_string(),
            ));
        }
        self.constructors.insert(method, constructor);
        Ok(())
    }

    /// Whether `method` can be built without falling back
    pub fn is_available(&self, method: ForecastMethod) -> bool {
        match method {
            ForecastMethod::Ensemble => !self.constructors.is_empty(),
            m => self.constructors.contains_key(&m),
        }
    }

    /// Method that `create` will actually build for `method`
    pub fn resolve(&self, method: ForecastMethod) -> ForecastMethod {
        if self.is_available(method) {
            method
        } else {
            ForecastMethod::Autoregressive
        }
    }

    /// Build an unfit strategy for `config.method`.
    ///
    /// Returns the method actually built next to the strategy; it differs
    /// from the requested one after a fallback.
    pub fn create(&self, config: &ForecastConfig) -> Result<(ForecastMethod, BoxedStrategy)> {
        if config.method == ForecastMethod::Ensemble {
            let ensemble = self.create_ensemble(config)?;
            return Ok((ForecastMethod::Ensemble, Box::new(ensemble)));
        }
        match self.constructors.get(&config.method) {
            Some(constructor) => Ok((config.method, constructor(config)?)),
            None => {
                warn!(
                    requested = %config.method,
                    "forecast method unavailable; falling back to the autoregressive model"
                );
                Ok((ForecastMethod::Autoregressive, fallback(config)))
            }
        }
    }

    /// Build an ensemble from `config.hyperparameters`.
    ///
    /// Members the registry cannot build are dropped with a warning.
    pub fn create_ensemble(&self, config: &ForecastConfig) -> Result<EnsembleCoordinator> {
        let params: EnsembleParams = match StrategyParams::from_config(config)? {
            StrategyParams::Ensemble(params) => params,
            other => return Err(mismatch(config.method, &other)),
        };

        let mut members = Vec::new();
        for method in params.members() {
            let Some(constructor) = self.constructors.get(&method) else {
                warn!(member = %method, "ensemble member unavailable; dropping it");
                continue;
            };
            let member_config = config.for_member(method, params.member_hyperparameters(method)?);
            members.push((method.as_str().to_string(), constructor(&member_config)?));
        }
        if members.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "No ensemble member can be built".to_string(),
            ));
        }

        match params.raw_weights()? {
            None => EnsembleCoordinator::new(members),
            Some(raw) => {
                let weights = raw
                    .into_iter()
                    .filter(|(m, _)| self.constructors.contains_key(m))
                    .map(|(m, w)| (m.as_str().to_string(), w))
                    .collect();
                EnsembleCoordinator::with_weights(members, weights)
            }
        }
    }
}
