//! # Cashflow workspace
//!
//! Umbrella crate for the workspace members.
//!
//! - [`cashflow_forecast`]: series handling, forecasting strategies,
//!   ensembles, backtesting and the request orchestrator
//! - [`forecast_math`]: the numerical building blocks underneath
//!
//! ```
//! use cashflow_workspace::cashflow_forecast::{ForecastConfig, ForecastMethod};
//!
//! let config = ForecastConfig::new(ForecastMethod::Ensemble).with_horizon(14);
//! assert!(config.validate().is_ok());
//! ```

pub use cashflow_forecast;
pub use forecast_math;
