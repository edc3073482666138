//! Forecast request configuration and per-strategy hyperparameters
//!
//! Hyperparameters arrive as an opaque JSON map. Each strategy owns a typed
//! parameter struct that rejects keys it does not know.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Forecasting technique requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Autoregressive integrated moving average
    #[serde(alias = "arima")]
    Autoregressive,
    /// Growth curve plus seasonal and holiday components
    #[serde(alias = "prophet")]
    TrendDecomposition,
    /// Recurrent network trained on sliding windows
    #[serde(alias = "lstm")]
    SequenceLearning,
    /// Weighted combination of the other methods
    Ensemble,
}

impl ForecastMethod {
    /// Methods that can be ensemble members
    pub const SINGLE: [ForecastMethod; 3] = [
        ForecastMethod::Autoregressive,
        ForecastMethod::TrendDecomposition,
        ForecastMethod::SequenceLearning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastMethod::Autoregressive => "autoregressive",
            ForecastMethod::TrendDecomposition => "trend_decomposition",
            ForecastMethod::SequenceLearning => "sequence_learning",
            ForecastMethod::Ensemble => "ensemble",
        }
    }
}

impl Default for ForecastMethod {
    fn default() -> Self {
        ForecastMethod::Autoregressive
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "autoregressive" | "arima" => Ok(ForecastMethod::Autoregressive),
            "trend_decomposition" | "prophet" => Ok(ForecastMethod::TrendDecomposition),
            "sequence_learning" | "lstm" => Ok(ForecastMethod::SequenceLearning),
            "ensemble" => Ok(ForecastMethod::Ensemble),
            other => Err(ForecastError::InvalidConfig(format!(
                "Unknown forecast method: {}",
                other
            ))),
        }
    }
}

/// How seasonal components combine with the growth curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

impl Default for SeasonalityMode {
    fn default() -> Self {
        SeasonalityMode::Multiplicative
    }
}

fn default_horizon() -> usize {
    30
}

fn default_confidence() -> f64 {
    0.95
}

fn yes() -> bool {
    true
}

/// Immutable configuration of one forecast request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    #[serde(default)]
    pub method: ForecastMethod,
    /// Days to forecast, 1..=365
    #[serde(default = "default_horizon", alias = "prediction_days")]
    pub horizon_days: usize,
    /// Interval coverage, 0.5..=0.99
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default = "yes")]
    pub include_holidays: bool,
    #[serde(default)]
    pub seasonality_mode: SeasonalityMode,
    /// Model the day-of-week cycle in the trend-decomposition strategy
    #[serde(default = "yes")]
    pub use_weekday_patterns: bool,
    /// Strategy specific settings, validated by the selected strategy
    #[serde(default)]
    pub hyperparameters: Map<String, Value>,
    /// Run a holdout backtest and attach accuracy metrics
    #[serde(default = "yes")]
    pub evaluate: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            method: ForecastMethod::default(),
            horizon_days: default_horizon(),
            confidence_level: default_confidence(),
            include_holidays: true,
            seasonality_mode: SeasonalityMode::default(),
            use_weekday_patterns: true,
            hyperparameters: Map::new(),
            evaluate: true,
        }
    }
}

impl ForecastConfig {
    pub fn new(method: ForecastMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_horizon(mut self, horizon_days: usize) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_confidence(mut self, confidence_level: f64) -> Self {
        self.confidence_level = confidence_level;
        self
    }

    pub fn with_holidays(mut self, include_holidays: bool) -> Self {
        self.include_holidays = include_holidays;
        self
    }

    pub fn with_seasonality_mode(mut self, mode: SeasonalityMode) -> Self {
        self.seasonality_mode = mode;
        self
    }

    pub fn with_weekday_patterns(mut self, enabled: bool) -> Self {
        self.use_weekday_patterns = enabled;
        self
    }

    pub fn with_evaluation(mut self, evaluate: bool) -> Self {
        self.evaluate = evaluate;
        self
    }

    /// Set one hyperparameter
    pub fn with_hyperparameter(mut self, key: &str, value: Value) -> Self {
        self.hyperparameters.insert(key.to_string(), value);
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The same request for another method with other hyperparameters
    pub fn for_member(&self, method: ForecastMethod, hyperparameters: Map<String, Value>) -> Self {
        Self {
            method,
            hyperparameters,
            evaluate: false,
            ..self.clone()
        }
    }

    /// Check ranges and the hyperparameters of the selected method
    pub fn validate(&self) -> Result<StrategyParams> {
        if !(1..=365).contains(&self.horizon_days) {
            return Err(ForecastError::InvalidConfig(format!(
                "horizon_days must be within 1..=365, got {}",
                self.horizon_days
            )));
        }
        if !(0.5..=0.99).contains(&self.confidence_level) {
            return Err(ForecastError::InvalidConfig(format!(
                "confidence_level must be within 0.5..=0.99, got {}",
                self.confidence_level
            )));
        }
        StrategyParams::from_config(self)
    }
}

/// Seasonal component switch: explicit on/off or decided by the data length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Auto,
    On,
    Off,
}

impl Serialize for Toggle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Toggle::Auto => serializer.serialize_str("auto"),
            Toggle::On => serializer.serialize_bool(true),
            Toggle::Off => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(Toggle::On),
            Repr::Flag(false) => Ok(Toggle::Off),
            Repr::Word(word) if word == "auto" => Ok(Toggle::Auto),
            Repr::Word(word) => Err(de::Error::custom(format!(
                "expected true, false or \"auto\", got \"{}\"",
                word
            ))),
        }
    }
}

impl Toggle {
    /// Resolve `Auto` using whether the data supports the component
    pub fn resolve(self, supported: bool) -> bool {
        match self {
            Toggle::Auto => supported,
            Toggle::On => true,
            Toggle::Off => false,
        }
    }
}

/// Non-seasonal `(p, d, q)` order, or `"auto"` to pick it from the data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArimaOrder {
    Fixed(usize, usize, usize),
    Auto,
}

impl Serialize for ArimaOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ArimaOrder::Fixed(p, d, q) => (p, d, q).serialize(serializer),
            ArimaOrder::Auto => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for ArimaOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Triple(usize, usize, usize),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Triple(p, d, q) => Ok(ArimaOrder::Fixed(p, d, q)),
            Repr::Word(word) if word == "auto" => Ok(ArimaOrder::Auto),
            Repr::Word(word) => Err(de::Error::custom(format!(
                "expected [p, d, q] or \"auto\", got \"{}\"",
                word
            ))),
        }
    }
}

/// Autoregressive model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArimaParams {
    pub order: ArimaOrder,
    /// (P, D, Q, s)
    pub seasonal_order: (usize, usize, usize, usize),
    /// Iteration cap of the coefficient search
    pub max_iterations: usize,
    /// Restrict the AR coefficients to the stationary region
    pub enforce_stationarity: bool,
}

impl Default for ArimaParams {
    fn default() -> Self {
        Self {
            order: ArimaOrder::Fixed(1, 1, 1),
            seasonal_order: (0, 0, 0, 0),
            max_iterations: 1000,
            enforce_stationarity: false,
        }
    }
}

impl ArimaParams {
    fn validate(&self) -> Result<()> {
        let (sp, sd, sq, s) = self.seasonal_order;
        if let ArimaOrder::Fixed(p, d, q) = self.order {
            if p > 5 || q > 5 {
                return Err(ForecastError::InvalidConfig(
                    "AR/MA orders are limited to 5".to_string(),
                ));
            }
            if d > 2 {
                return Err(ForecastError::InvalidConfig(
                    "Differencing order is limited to 2".to_string(),
                ));
            }
        }
        if sp > 2 || sq > 2 {
            return Err(ForecastError::InvalidConfig(
                "Seasonal AR/MA orders are limited to 2".to_string(),
            ));
        }
        if sd > 1 {
            return Err(ForecastError::InvalidConfig(
                "Seasonal differencing is limited to 1".to_string(),
            ));
        }
        if (sp + sd + sq) > 0 && s < 2 {
            return Err(ForecastError::InvalidConfig(
                "A seasonal order needs a period of at least 2".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ForecastError::InvalidConfig(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shape of the growth curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    /// Piecewise-linear trend with changepoints
    Linear,
    /// Constant level, no trend or changepoints
    Flat,
}

impl Default for Growth {
    fn default() -> Self {
        Growth::Linear
    }
}

/// Trend-decomposition model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrendParams {
    pub growth: Growth,
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may be placed
    pub changepoint_range: f64,
    /// Larger values let the growth rate change more freely
    pub changepoint_prior_scale: f64,
    pub weekly_seasonality: Toggle,
    pub yearly_seasonality: Toggle,
    /// Daily observations carry no intra-day cycle, so only `auto` and
    /// `false` are accepted
    pub daily_seasonality: Toggle,
    pub weekly_order: usize,
    pub yearly_order: usize,
    /// Extra holiday dates on top of the built-in calendar
    pub holidays: Vec<NaiveDate>,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            growth: Growth::Linear,
            n_changepoints: 10,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            weekly_seasonality: Toggle::Auto,
            yearly_seasonality: Toggle::Auto,
            daily_seasonality: Toggle::Auto,
            weekly_order: 3,
            yearly_order: 10,
            holidays: Vec::new(),
        }
    }
}

impl TrendParams {
    fn validate(&self) -> Result<()> {
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidConfig(
                "changepoint_range must be within (0, 1]".to_string(),
            ));
        }
        if !(self.changepoint_prior_scale > 0.0) {
            return Err(ForecastError::InvalidConfig(
                "changepoint_prior_scale must be positive".to_string(),
            ));
        }
        if self.daily_seasonality == Toggle::On {
            return Err(ForecastError::InvalidConfig(
                "daily_seasonality needs intra-day observations".to_string(),
            ));
        }
        if self.weekly_order > 3 {
            return Err(ForecastError::InvalidConfig(
                "weekly_order cannot exceed 3 for a 7-day period".to_string(),
            ));
        }
        if self.yearly_order > 20 {
            return Err(ForecastError::InvalidConfig(
                "yearly_order cannot exceed 20".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sequence-learning model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequenceParams {
    /// Window length fed to the network
    pub n_steps: usize,
    /// Hidden units
    pub n_units: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Share of hidden units dropped from the output layer while training
    pub dropout: f64,
    /// Share of windows held out for early stopping
    pub validation_split: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Monte Carlo paths for the interval
    pub simulations: usize,
    /// Relative noise injected into every fed-back value
    pub noise_level: f64,
    /// Weight initialisation seed
    pub seed: u64,
    /// Monte Carlo seed; fresh entropy when absent
    pub mc_seed: Option<u64>,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            n_steps: 10,
            n_units: 16,
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.01,
            dropout: 0.0,
            validation_split: 0.2,
            patience: 10,
            simulations: 100,
            noise_level: 0.05,
            seed: 42,
            mc_seed: None,
        }
    }
}

impl SequenceParams {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("n_steps", self.n_steps),
            ("n_units", self.n_units),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("patience", self.patience),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ForecastError::InvalidConfig(format!(
                "{} must be positive",
                name
            )));
        }
        if self.simulations < 2 {
            return Err(ForecastError::InvalidConfig(
                "simulations must be at least 2".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ForecastError::InvalidConfig(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(0.0..=0.5).contains(&self.validation_split) {
            return Err(ForecastError::InvalidConfig(
                "validation_split must be within 0..=0.5".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidConfig(
                "dropout must be within 0..1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.noise_level) {
            return Err(ForecastError::InvalidConfig(
                "noise_level must be within 0..1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ensemble settings. Member settings use the legacy key names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnsembleParams {
    /// Members; every single method when absent
    pub models: Option<Vec<ForecastMethod>>,
    /// Member name -> weight; uniform when absent
    pub weights: Option<BTreeMap<String, f64>>,
    pub arima_params: ArimaParams,
    pub prophet_params: TrendParams,
    pub lstm_params: SequenceParams,
}

impl EnsembleParams {
    /// Configured members, without duplicates, in configuration order
    pub fn members(&self) -> Vec<ForecastMethod> {
        let mut members = Vec::new();
        for m in self.models.clone().unwrap_or_else(|| ForecastMethod::SINGLE.to_vec()) {
            if !members.contains(&m) {
                members.push(m);
            }
        }
        members
    }

    /// Hyperparameter map for one member
    pub fn member_hyperparameters(&self, method: ForecastMethod) -> Result<Map<String, Value>> {
        let value = match method {
            ForecastMethod::Autoregressive => serde_json::to_value(&self.arima_params)?,
            ForecastMethod::TrendDecomposition => serde_json::to_value(&self.prophet_params)?,
            ForecastMethod::SequenceLearning => serde_json::to_value(&self.lstm_params)?,
            ForecastMethod::Ensemble => {
                return Err(ForecastError::InvalidConfig(
                    "An ensemble cannot contain another ensemble".to_string(),
                ))
            }
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Weights keyed by member method, before normalisation
    pub fn raw_weights(&self) -> Result<Option<BTreeMap<ForecastMethod, f64>>> {
        let Some(weights) = &self.weights else {
            return Ok(None);
        };
        let mut parsed = BTreeMap::new();
        for (name, &weight) in weights {
            let method = name.parse::<ForecastMethod>()?;
            if parsed.insert(method, weight).is_some() {
                return Err(ForecastError::InvalidConfig(format!(
                    "Weight for {} given more than once",
                    method
                )));
            }
        }
        Ok(Some(parsed))
    }

    fn validate(&self) -> Result<()> {
        let members = self.members();
        if members.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "An ensemble needs at least one member".to_string(),
            ));
        }
        if members.contains(&ForecastMethod::Ensemble) {
            return Err(ForecastError::InvalidConfig(
                "An ensemble cannot contain another ensemble".to_string(),
            ));
        }
        if let Some(weights) = self.raw_weights()? {
            if let Some(stray) = weights.keys().find(|m| !members.contains(m)) {
                return Err(ForecastError::InvalidConfig(format!(
                    "Weight given for {} which is not an ensemble member",
                    stray
                )));
            }
            if weights.values().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(ForecastError::InvalidConfig(
                    "Ensemble weights must be finite and non-negative".to_string(),
                ));
            }
        }
        self.arima_params.validate()?;
        self.prophet_params.validate()?;
        self.lstm_params.validate()
    }
}

/// Typed hyperparameters, one variant per method
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyParams {
    Autoregressive(ArimaParams),
    TrendDecomposition(TrendParams),
    SequenceLearning(SequenceParams),
    Ensemble(EnsembleParams),
}

fn parse<T: serde::de::DeserializeOwned>(method: ForecastMethod, map: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
        ForecastError::InvalidConfig(format!("Invalid {} hyperparameters: {}", method, e))
    })
}

impl StrategyParams {
    /// Parse and validate the hyperparameters of `config.method`
    pub fn from_config(config: &ForecastConfig) -> Result<Self> {
        let map = &config.hyperparameters;
        let params = match config.method {
            ForecastMethod::Autoregressive => {
                let p: ArimaParams = parse(config.method, map)?;
                p.validate()?;
                StrategyParams::Autoregressive(p)
            }
            ForecastMethod::TrendDecomposition => {
                let p: TrendParams = parse(config.method, map)?;
                p.validate()?;
                StrategyParams::TrendDecomposition(p)
            }
            ForecastMethod::SequenceLearning => {
                let p: SequenceParams = parse(config.method, map)?;
                p.validate()?;
                StrategyParams::SequenceLearning(p)
            }
            ForecastMethod::Ensemble => {
                let p: EnsembleParams = parse(config.method, map)?;
                p.validate()?;
                StrategyParams::Ensemble(p)
            }
        };
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ForecastConfig::from_json("{}").unwrap();
        assert_eq!(config, ForecastConfig::default());
        assert_eq!(config.horizon_days, 30);
        assert_eq!(config.seasonality_mode, SeasonalityMode::Multiplicative);
    }

    #[test]
    fn test_legacy_method_names() {
        let config = ForecastConfig::from_json(r#"{"method": "lstm", "prediction_days": 7}"#).unwrap();
        assert_eq!(config.method, ForecastMethod::SequenceLearning);
        assert_eq!(config.horizon_days, 7);
        assert_eq!("prophet".parse::<ForecastMethod>().unwrap(), ForecastMethod::TrendDecomposition);
    }

    #[test]
    fn test_unknown_hyperparameter_rejected() {
        let config = ForecastConfig::new(ForecastMethod::Autoregressive)
            .with_hyperparameter("ordr", json!([1, 1, 1]));
        assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_arima_order_parsed() {
        let config = ForecastConfig::new(ForecastMethod::Autoregressive)
            .with_hyperparameter("order", json!([2, 1, 0]));
        match config.validate().unwrap() {
            StrategyParams::Autoregressive(p) => assert_eq!(p.order, ArimaOrder::Fixed(2, 1, 0)),
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_arima_auto_order_and_stationarity_flag() {
        let params: ArimaParams =
            serde_json::from_value(json!({"order": "auto", "enforce_stationarity": true})).unwrap();
        assert_eq!(params.order, ArimaOrder::Auto);
        assert!(params.enforce_stationarity);
        assert_eq!(serde_json::to_value(&params.order).unwrap(), json!("auto"));
        assert_eq!(
            serde_json::to_value(ArimaParams::default().order).unwrap(),
            json!([1, 1, 1])
        );
        assert!(serde_json::from_value::<ArimaParams>(json!({"order": "best"})).is_err());
    }

    #[test]
    fn test_legacy_model_keys_accepted() {
        let trend: TrendParams =
            serde_json::from_value(json!({"growth": "flat", "daily_seasonality": false})).unwrap();
        assert_eq!(trend.growth, Growth::Flat);
        assert_eq!(trend.daily_seasonality, Toggle::Off);

        let daily = ForecastConfig::new(ForecastMethod::TrendDecomposition)
            .with_hyperparameter("daily_seasonality", json!(true));
        assert!(matches!(daily.validate(), Err(ForecastError::InvalidConfig(_))));

        let sequence = ForecastConfig::new(ForecastMethod::SequenceLearning)
            .with_hyperparameter("dropout", json!(0.2));
        match sequence.validate().unwrap() {
            StrategyParams::SequenceLearning(p) => assert_eq!(p.dropout, 0.2),
            other => panic!("unexpected params {:?}", other),
        }
        let too_much = ForecastConfig::new(ForecastMethod::SequenceLearning)
            .with_hyperparameter("dropout", json!(1.0));
        assert!(too_much.validate().is_err());

        let config =
            ForecastConfig::from_json(r#"{"method": "prophet", "use_weekday_patterns": false}"#)
                .unwrap();
        assert!(!config.use_weekday_patterns);
        assert!(ForecastConfig::from_json("{}").unwrap().use_weekday_patterns);
    }

    #[test]
    fn test_toggle_accepts_bool_and_auto() {
        let params: TrendParams =
            serde_json::from_value(json!({"weekly_seasonality": false, "yearly_seasonality": "auto"}))
                .unwrap();
        assert_eq!(params.weekly_seasonality, Toggle::Off);
        assert_eq!(params.yearly_seasonality, Toggle::Auto);
        assert!(serde_json::from_value::<TrendParams>(json!({"weekly_seasonality": "sometimes"})).is_err());
    }

    #[test]
    fn test_ensemble_member_params_roundtrip() {
        let params = EnsembleParams::default();
        let map = params.member_hyperparameters(ForecastMethod::SequenceLearning).unwrap();
        let back: SequenceParams = serde_json::from_value(Value::Object(map)).unwrap();
        assert_eq!(back, SequenceParams::default());
    }

    #[test]
    fn test_ensemble_rejects_stray_weight() {
        let config = ForecastConfig::new(ForecastMethod::Ensemble)
            .with_hyperparameter("models", json!(["arima"]))
            .with_hyperparameter("weights", json!({"lstm": 1.0}));
        assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_ensemble_rejects_duplicate_weight() {
        let config = ForecastConfig::new(ForecastMethod::Ensemble)
            .with_hyperparameter("models", json!(["arima", "lstm"]))
            .with_hyperparameter("weights", json!({"arima": 0.7, "autoregressive": 0.3}));
        match config.validate() {
            Err(ForecastError::InvalidConfig(msg)) => assert!(msg.contains("more than once")),
            other => panic!("expected a duplicate weight error, got {:?}", other),
        }
    }

    #[test]
    fn test_range_checks() {
        assert!(ForecastConfig::default().with_horizon(0).validate().is_err());
        assert!(ForecastConfig::default().with_horizon(366).validate().is_err());
        assert!(ForecastConfig::default().with_confidence(0.995).validate().is_err());
        assert!(ForecastConfig::default().with_confidence(0.5).validate().is_ok());
    }
}
