//! Command-line front end: forecast a `date,value` CSV and print JSON

use cashflow_forecast::{
    CashflowProfile, DataLoader, ForecastConfig, ForecastMethod, ForecastOrchestrator,
    SeriesOptions,
};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cashflow-forecast", version, about = "Forecast merchant cash flow from daily history")]
struct Cli {
    /// CSV file with `date,value` columns
    #[arg(short, long)]
    input: PathBuf,

    /// JSON forecast configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// autoregressive | trend_decomposition | sequence_learning | ensemble
    #[arg(short, long)]
    method: Option<ForecastMethod>,

    /// Days to forecast
    #[arg(long)]
    horizon: Option<usize>,

    /// Interval coverage between 0.5 and 0.99
    #[arg(long)]
    confidence: Option<f64>,

    /// Merchant identifier recorded in the result
    #[arg(long, default_value = "merchant")]
    merchant: String,

    /// Skip the holdout backtest
    #[arg(long)]
    no_evaluate: bool,

    /// Include the cash-flow profile of the history
    #[arg(long)]
    profile: bool,

    /// Write the JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<T: Serialize> {
    forecast: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<CashflowProfile>,
}

fn load_config(cli: &Cli) -> Result<ForecastConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ForecastConfig::from_json(&fs::read_to_string(path)?)?,
        None => ForecastConfig::default(),
    };
    if let Some(method) = cli.method {
        config.method = method;
    }
    if let Some(horizon) = cli.horizon {
        config.horizon_days = horizon;
    }
    if let Some(confidence) = cli.confidence {
        config.confidence_level = confidence;
    }
    if cli.no_evaluate {
        config.evaluate = false;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!(input = %cli.input.display(), "loading history");
    let series = DataLoader::from_csv(&cli.input, &cli.merchant, &SeriesOptions::default())?;

    let result = ForecastOrchestrator::new().generate(&series, &config)?;
    let profile = if cli.profile {
        Some(CashflowProfile::from_series(&series)?)
    } else {
        None
    };

    let json = serde_json::to_string_pretty(&Report {
        forecast: &result,
        profile,
    })?;
    match &cli.output {
        Some(path) => {
            fs::write(path, json)?;
            info!(output = %path.display(), "forecast written");
        }
        None => println!("{}", json),
    }

    if let Some(metrics) = &result.metrics {
        eprint!("{}", metrics);
    }
    Ok(())
}
