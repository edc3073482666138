//! Historical cash-flow series handling for forecasting
//!
//! The engine does not impute missing days: gaps in the input stay gaps, and
//! filling them is the caller's job.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// A single dated observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    #[serde(alias = "ds")]
    date: NaiveDate,
    #[serde(alias = "y")]
    value: f64,
}

impl TimeSeriesPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TimeRange {
    /// Create a range, rejecting an end before the start
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if end_date < start_date {
            return Err(ForecastError::DataError(format!(
                "Range end {} is before its start {}",
                end_date, start_date
            )));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }
}

/// Options applied while preparing a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesOptions {
    /// Minimum number of observations
    pub min_length: usize,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self { min_length: 2 }
    }
}

/// Validated, chronologically ordered history of one merchant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalSeries {
    merchant_id: String,
    time_range: TimeRange,
    points: Vec<TimeSeriesPoint>,
}

impl HistoricalSeries {
    /// Validate raw points with the default options
    pub fn prepare(merchant_id: impl Into<String>, raw_points: Vec<TimeSeriesPoint>) -> Result<Self> {
        Self::prepare_with(merchant_id, raw_points, &SeriesOptions::default())
    }

    /// Validate raw points: sort by date, reject duplicate dates, non-finite
    /// values and series shorter than `options.min_length`.
    pub fn prepare_with(
        merchant_id: impl Into<String>,
        mut raw_points: Vec<TimeSeriesPoint>,
        options: &SeriesOptions,
    ) -> Result<Self> {
        let min_length = options.min_length.max(1);
        if raw_points.len() < min_length {
            return Err(ForecastError::DataError(format!(
                "Need at least {} observations, got {}",
                min_length,
                raw_points.len()
            )));
        }

        if let Some(bad) = raw_points.iter().find(|p| !p.value.is_finite()) {
            return Err(ForecastError::DataError(format!(
                "Non-finite value on {}",
                bad.date
            )));
        }

        raw_points.sort_by_key(|p| p.date);

        if let Some(pair) = raw_points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(ForecastError::DataError(format!(
                "Duplicate observation for {}",
                pair[0].date
            )));
        }

        Ok(Self::from_sorted(merchant_id.into(), raw_points))
    }

    // Callers guarantee `points` is non-empty and strictly increasing.
    fn from_sorted(merchant_id: String, points: Vec<TimeSeriesPoint>) -> Self {
        let time_range = TimeRange {
            start_date: points[0].date,
            end_date: points[points.len() - 1].date,
        };
        Self {
            merchant_id,
            time_range,
            points,
        }
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    /// Observed values in date order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Observation dates in ascending order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.time_range.start_date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.time_range.end_date
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Split off the last `tail` observations.
    ///
    /// Returns `None` for the head when nothing would remain in it.
    pub fn split_tail(&self, tail: usize) -> (Option<HistoricalSeries>, &[TimeSeriesPoint]) {
        let cut = self.points.len().saturating_sub(tail);
        let head = if cut == 0 {
            None
        } else {
            Some(Self::from_sorted(
                self.merchant_id.clone(),
                self.points[..cut].to_vec(),
            ))
        };
        (head, &self.points[cut..])
    }
}

/// Data loader for cash-flow series stored as `date,value` CSV
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load and prepare a series from a CSV file
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        merchant_id: &str,
        options: &SeriesOptions,
    ) -> Result<HistoricalSeries> {
        let file = File::open(path)?;
        Self::from_reader(file, merchant_id, options)
    }

    /// Load and prepare a series from any CSV source
    pub fn from_reader<R: std::io::Read>(
        reader: R,
        merchant_id: &str,
        options: &SeriesOptions,
    ) -> Result<HistoricalSeries> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let points = csv_reader
            .deserialize::<TimeSeriesPoint>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        HistoricalSeries::prepare_with(merchant_id, points, options)
    }
}
