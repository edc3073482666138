//! # Cashflow Forecast
//!
//! A Rust library for forecasting merchant cash flow from daily history.
//!
//! ## Features
//!
//! - Validated daily series (`HistoricalSeries`) loaded from memory or CSV
//! - Forecasting strategies behind one trait (`PredictorStrategy`):
//!   ARIMA, a decomposable trend/seasonality/holiday model and a recurrent
//!   sequence model with Monte Carlo intervals
//! - Weighted ensembles that drop failing members and rescale the rest
//! - Holdout backtesting with MAPE, RMSE, MAE and R²
//! - A cash-flow profile (average, volatility, trend, weekly seasonality)
//!
//! ## Quick Start
//!
//! ```no_run
//! use cashflow_forecast::{DataLoader, ForecastConfig, ForecastMethod, ForecastOrchestrator, SeriesOptions};
//!
//! let series = DataLoader::from_csv("daily_cash.csv", "merchant-42", &SeriesOptions::default())?;
//! let config = ForecastConfig::new(ForecastMethod::Ensemble).with_horizon(14);
//!
//! let result = ForecastOrchestrator::new().generate(&series, &config)?;
//! for point in &result.points {
//!     println!("{} {:.2} [{:.2}, {:.2}]", point.date, point.point_estimate, point.lower_bound, point.upper_bound);
//! }
//! # Ok::<(), cashflow_forecast::ForecastError>(())
//! ```
//!
//! ## Optional strategies
//!
//! The `trend-model` and `sequence-model` features (both on by default)
//! compile the corresponding strategies. Without them, requests for those
//! methods are served by the autoregressive model and a warning is logged.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod utils;

// Re-export commonly used types
pub use crate::analysis::CashflowProfile;
pub use crate::config::{ForecastConfig, ForecastMethod, SeasonalityMode, StrategyParams};
pub use crate::data::{DataLoader, HistoricalSeries, SeriesOptions, TimeRange, TimeSeriesPoint};
pub use crate::error::ForecastError;
pub use crate::metrics::{AccuracyEvaluator, AccuracyMetrics};
pub use crate::models::ensemble::{EnsembleCoordinator, EnsembleWeights};
pub use crate::models::registry::StrategyRegistry;
pub use crate::models::{ForecastPoint, ModelState, PredictorStrategy};
pub use crate::orchestrator::{ForecastOrchestrator, ForecastResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
