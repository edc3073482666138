//! Decomposable trend model: piecewise-linear growth, Fourier seasonality and
//! holiday effects
//!
//! Time is scaled to `[0, 1]` over the training span and values are divided
//! by their largest magnitude before fitting. Growth changepoints sit at
//! evenly spaced observations within the first `changepoint_range` of the
//! history, and their rate adjustments are shrunk towards zero with a ridge
//! penalty of `1 / changepoint_prior_scale`.
//!
//! With flat growth the curve is a single level and no changepoints are
//! placed.
//!
//! In multiplicative mode the growth curve is fitted first and the seasonal
//! and holiday terms are then fitted to `y / g - 1`.

use crate::config::{Growth, SeasonalityMode, TrendParams};
use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use crate::models::{forecast_dates, require_length, ForecastPoint, Lifecycle, ModelState, PredictorStrategy};
use chrono::{Datelike, NaiveDate};
use forecast_math::linalg::{dot, ridge_least_squares};
use forecast_math::stats::{normal_critical_value, std_dev};
use forecast_math::ensure_finite;
use std::f64::consts::PI;
use tracing::{debug, info};

const WEEK: f64 = 7.0;
const YEAR: f64 = 365.25;
const SEASONALITY_PENALTY: f64 = 0.1;
const HOLIDAY_PENALTY: f64 = 0.1;
const BASE_PENALTY: f64 = 1e-8;

/// Days of history that switch weekly seasonality on in `auto` mode
const WEEKLY_MIN_SPAN: i64 = 14;
/// Days of history that switch yearly seasonality on in `auto` mode
const YEARLY_MIN_SPAN: i64 = 730;

/// A calendar effect with its own regressor
#[derive(Debug, Clone, PartialEq)]
enum Holiday {
    /// Recurring every year on `month`, days `first..=last`
    Annual {
        name: &'static str,
        month: u32,
        first: u32,
        last: u32,
    },
    /// A single date supplied by the caller
    Once(NaiveDate),
}

impl Holiday {
    fn builtin() -> [Holiday; 3] {
        [
            Holiday::Annual {
                name: "new_year",
                month: 1,
                first: 1,
                last: 1,
            },
            Holiday::Annual {
                name: "labour_day",
                month: 5,
                first: 1,
                last: 3,
            },
            Holiday::Annual {
                name: "national_day",
                month: 10,
                first: 1,
                last: 7,
            },
        ]
    }

    fn covers(&self, date: NaiveDate) -> bool {
        match self {
            Holiday::Annual {
                month, first, last, ..
            } => date.month() == *month && (*first..=*last).contains(&date.day()),
            Holiday::Once(day) => *day == date,
        }
    }

    fn label(&self) -> String {
        match self {
            Holiday::Annual { name, .. } => name.to_string(),
            Holiday::Once(day) => day.to_string(),
        }
    }
}

/// Regressor layout decided at fit time
#[derive(Debug, Clone)]
struct Features {
    growth: Growth,
    origin: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    weekly_order: usize,
    yearly_order: usize,
    holidays: Vec<Holiday>,
}

impl Features {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64 / self.span_days
    }

    /// `[1, t, (t - c_1)+, ..., (t - c_k)+]`, or `[1]` for flat growth
    fn growth_row(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let mut row = Vec::with_capacity(2 + self.changepoints.len());
        row.push(1.0);
        if self.growth == Growth::Linear {
            row.push(t);
            row.extend(self.changepoints.iter().map(|c| (t - c).max(0.0)));
        }
        row
    }

    fn growth_penalties(&self, prior_scale: f64) -> Vec<f64> {
        let mut penalties = match self.growth {
            Growth::Linear => vec![BASE_PENALTY, BASE_PENALTY],
            Growth::Flat => vec![BASE_PENALTY],
        };
        penalties.extend(std::iter::repeat(1.0 / prior_scale).take(self.changepoints.len()));
        penalties
    }

    /// Fourier terms on the absolute calendar followed by holiday indicators
    fn seasonal_row(&self, date: NaiveDate) -> Vec<f64> {
        let day = date.num_days_from_ce() as f64;
        let mut row = Vec::with_capacity(self.seasonal_width());
        for (period, order) in [(WEEK, self.weekly_order), (YEAR, self.yearly_order)] {
            for k in 1..=order {
                let angle = 2.0 * PI * k as f64 * day / period;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }
        row.extend(
            self.holidays
                .iter()
                .map(|h| if h.covers(date) { 1.0 } else { 0.0 }),
        );
        row
    }

    fn seasonal_width(&self) -> usize {
        2 * (self.weekly_order + self.yearly_order) + self.holidays.len()
    }

    fn seasonal_penalties(&self) -> Vec<f64> {
        let fourier = 2 * (self.weekly_order + self.yearly_order);
        let mut penalties = vec![SEASONALITY_PENALTY; fourier];
        penalties.extend(std::iter::repeat(HOLIDAY_PENALTY).take(self.holidays.len()));
        penalties
    }
}

#[derive(Debug, Clone)]
struct FittedTrend {
    features: Features,
    growth: Vec<f64>,
    seasonal: Vec<f64>,
    y_scale: f64,
    /// Residual standard deviation on the fitting scale
    sigma: f64,
    observations: usize,
    last_date: NaiveDate,
}

/// Decomposable growth/seasonality/holiday model
#[derive(Debug, Clone)]
pub struct TrendModel {
    params: TrendParams,
    mode: SeasonalityMode,
    include_holidays: bool,
    weekday_patterns: bool,
    confidence_level: f64,
    lifecycle: Lifecycle,
    fitted: Option<FittedTrend>,
}

impl TrendModel {
    /// Create an unfit model with multiplicative seasonality and holidays on
    pub fn new(params: TrendParams, confidence_level: f64) -> Self {
        Self {
            params,
            mode: SeasonalityMode::Multiplicative,
            include_holidays: true,
            weekday_patterns: true,
            confidence_level,
            lifecycle: Lifecycle::new(),
            fitted: None,
        }
    }

    pub fn with_seasonality_mode(mut self, mode: SeasonalityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_holidays(mut self, include_holidays: bool) -> Self {
        self.include_holidays = include_holidays;
        self
    }

    /// Turn the day-of-week component off regardless of `weekly_seasonality`
    pub fn with_weekday_patterns(mut self, enabled: bool) -> Self {
        self.weekday_patterns = enabled;
        self
    }

    /// Labels of the holiday regressors chosen by the last fit
    pub fn active_holidays(&self) -> Vec<String> {
        self.fitted
            .as_ref()
            .map(|f| f.features.holidays.iter().map(Holiday::label).collect())
            .unwrap_or_default()
    }

    fn layout(&self, series: &HistoricalSeries) -> Features {
        let dates = series.dates();
        let origin = series.first_date();
        let span = (series.last_date() - origin).num_days();
        let span_days = span.max(1) as f64;

        let n = dates.len();
        let history = ((n as f64) * self.params.changepoint_range).floor() as usize;
        let count = match self.params.growth {
            Growth::Linear => self.params.n_changepoints.min(history.saturating_sub(1)),
            Growth::Flat => 0,
        };
        let changepoints = (1..=count)
            .map(|j| {
                let index = (j as f64 * (history - 1) as f64 / count as f64).round() as usize;
                (dates[index] - origin).num_days() as f64 / span_days
            })
            .collect();

        let weekly = self.weekday_patterns
            && self.params.weekly_seasonality.resolve(span >= WEEKLY_MIN_SPAN);
        let yearly = self.params.yearly_seasonality.resolve(span >= YEARLY_MIN_SPAN);

        let holidays = if self.include_holidays {
            Holiday::builtin()
                .into_iter()
                .chain(self.params.holidays.iter().copied().map(Holiday::Once))
                .filter(|h| dates.iter().any(|&d| h.covers(d)))
                .collect()
        } else {
            Vec::new()
        };

        Features {
            growth: self.params.growth,
            origin,
            span_days,
            changepoints,
            weekly_order: if weekly { self.params.weekly_order } else { 0 },
            yearly_order: if yearly { self.params.yearly_order } else { 0 },
            holidays,
        }
    }

    fn estimate(&self, series: &HistoricalSeries) -> Result<FittedTrend> {
        require_length("trend model", series, self.min_observations())?;

        let features = self.layout(series);
        let dates = series.dates();
        let values = series.values();
        let y_scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let growth_rows: Vec<Vec<f64>> = dates.iter().map(|&d| features.growth_row(d)).collect();
        let seasonal_rows: Vec<Vec<f64>> = dates.iter().map(|&d| features.seasonal_row(d)).collect();
        let growth_penalties = features.growth_penalties(self.params.changepoint_prior_scale);
        let width = features.growth_penalties(1.0).len();

        let (growth, seasonal, residuals) = match self.mode {
            SeasonalityMode::Additive => {
                let design: Vec<Vec<f64>> = growth_rows
                    .iter()
                    .zip(&seasonal_rows)
                    .map(|(g, s)| g.iter().chain(s).copied().collect())
                    .collect();
                let mut penalties = growth_penalties;
                penalties.extend(features.seasonal_penalties());
                let beta = ridge_least_squares(&design, &y, &penalties)?;
                let residuals: Vec<f64> = design
                    .iter()
                    .zip(&y)
                    .map(|(row, target)| target - dot(row, &beta))
                    .collect();
                let seasonal = beta[width..].to_vec();
                let growth = beta[..width].to_vec();
                (growth, seasonal, residuals)
            }
            SeasonalityMode::Multiplicative => {
                let growth = ridge_least_squares(&growth_rows, &y, &growth_penalties)?;
                let curve: Vec<f64> = growth_rows.iter().map(|row| dot(row, &growth)).collect();
                if let Some(i) = curve.iter().position(|g| g.abs() < 1e-6) {
                    return Err(ForecastError::ModelExecution(format!(
                        "Growth curve reaches zero on {}; multiplicative seasonality is undefined",
                        dates[i]
                    )));
                }
                let relative: Vec<f64> = y.iter().zip(&curve).map(|(v, g)| v / g - 1.0).collect();
                let seasonal = if features.seasonal_width() > 0 {
                    ridge_least_squares(&seasonal_rows, &relative, &features.seasonal_penalties())?
                } else {
                    Vec::new()
                };
                let residuals = seasonal_rows
                    .iter()
                    .zip(&relative)
                    .map(|(row, r)| r - dot(row, &seasonal))
                    .collect();
                (growth, seasonal, residuals)
            }
        };

        ensure_finite(&growth, "Trend growth fit")?;
        ensure_finite(&seasonal, "Trend seasonality fit")?;
        let sigma = std_dev(&residuals).unwrap_or(0.0);
        debug!(
            changepoints = features.changepoints.len(),
            weekly_order = features.weekly_order,
            yearly_order = features.yearly_order,
            holidays = features.holidays.len(),
            sigma,
            "trend model estimated"
        );

        Ok(FittedTrend {
            features,
            growth,
            seasonal,
            y_scale,
            sigma,
            observations: series.len(),
            last_date: series.last_date(),
        })
    }
}

impl PredictorStrategy for TrendModel {
    fn name(&self) -> &str {
        "trend_decomposition"
    }

    fn state(&self) -> ModelState {
        self.lifecycle.state()
    }

    fn min_observations(&self) -> usize {
        3
    }

    fn fit(&mut self, series: &HistoricalSeries) -> Result<()> {
        self.lifecycle.begin("trend model")?;
        info!(observations = series.len(), mode = ?self.mode, "fitting trend model");
        let outcome = self.estimate(series);
        let fitted = self.lifecycle.finish(outcome)?;
        self.fitted = Some(fitted);
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<ForecastPoint>> {
        self.lifecycle.ensure_fit("trend model")?;
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted("trend model".to_string()))?;
        let z = normal_critical_value(self.confidence_level)?;
        let n = fitted.observations as f64;

        let points = forecast_dates(fitted.last_date, horizon)?
            .into_iter()
            .enumerate()
            .map(|(h, date)| {
                let growth = dot(&fitted.features.growth_row(date), &fitted.growth);
                let season = dot(&fitted.features.seasonal_row(date), &fitted.seasonal);
                let widening = (1.0 + (h + 1) as f64 / n).sqrt();
                let (estimate, margin) = match self.mode {
                    SeasonalityMode::Additive => (growth + season, z * fitted.sigma * widening),
                    SeasonalityMode::Multiplicative => (
                        growth * (1.0 + season),
                        z * fitted.sigma * growth.abs() * widening,
                    ),
                };
                ForecastPoint::symmetric(date, estimate * fitted.y_scale, margin * fitted.y_scale)
            })
            .collect::<Vec<_>>();

        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(ForecastError::ModelExecution(format!(
                "Trend model produced a non-finite forecast for {}",
                bad.date
            )));
        }
        info!(horizon, "trend forecast complete");
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Toggle;
    use crate::data::TimeSeriesPoint;
    use approx::assert_relative_eq;

    fn daily(start: NaiveDate, values: impl IntoIterator<Item = f64>) -> HistoricalSeries {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint::new(start + chrono::Duration::days(i as i64), v))
            .collect();
        HistoricalSeries::prepare("m-1", points).unwrap()
    }

    #[test]
    fn test_additive_linear_growth() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let series = daily(start, (0..60).map(|t| 200.0 + 1.5 * t as f64));
        let params = TrendParams {
            weekly_seasonality: Toggle::Off,
            ..TrendParams::default()
        };
        let mut model = TrendModel::new(params, 0.95)
            .with_seasonality_mode(SeasonalityMode::Additive)
            .with_holidays(false);
        model.fit(&series).unwrap();

        let forecast = model.forecast(7).unwrap();
        assert_relative_eq!(forecast[0].point_estimate, 200.0 + 1.5 * 60.0, max_relative = 0.02);
        assert_relative_eq!(forecast[6].point_estimate, 200.0 + 1.5 * 66.0, max_relative = 0.02);
    }

    #[test]
    fn test_weekly_pattern_is_recovered() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let pattern = [1.0, 1.1, 0.9, 1.0, 1.2, 0.8, 1.0];
        let series = daily(start, (0..84).map(|t| 500.0 * pattern[t % 7]));
        let mut model = TrendModel::new(TrendParams::default(), 0.95).with_holidays(false);
        model.fit(&series).unwrap();

        let forecast = model.forecast(7).unwrap();
        let friday = forecast[4].point_estimate;
        let saturday = forecast[5].point_estimate;
        assert!(friday > saturday);
    }

    #[test]
    fn test_flat_growth_ignores_trend() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let series = daily(start, (0..40).map(|t| 300.0 + 2.0 * t as f64));
        let params = TrendParams {
            growth: Growth::Flat,
            weekly_seasonality: Toggle::Off,
            ..TrendParams::default()
        };
        let mut model = TrendModel::new(params, 0.95)
            .with_seasonality_mode(SeasonalityMode::Additive)
            .with_holidays(false);
        model.fit(&series).unwrap();

        let forecast = model.forecast(10).unwrap();
        assert_relative_eq!(forecast[0].point_estimate, 339.0, max_relative = 0.01);
        assert_relative_eq!(forecast[9].point_estimate, forecast[0].point_estimate, max_relative = 1e-9);
    }

    #[test]
    fn test_weekday_patterns_switch_off_weekly_terms() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let pattern = [1.0, 1.1, 0.9, 1.0, 1.2, 0.8, 1.0];
        let series = daily(start, (0..84).map(|t| 500.0 * pattern[t % 7]));
        let params = TrendParams {
            weekly_seasonality: Toggle::On,
            ..TrendParams::default()
        };
        let mut model = TrendModel::new(params, 0.95)
            .with_holidays(false)
            .with_weekday_patterns(false);
        model.fit(&series).unwrap();

        let forecast = model.forecast(7).unwrap();
        let highest = forecast.iter().map(|p| p.point_estimate).fold(f64::MIN, f64::max);
        let lowest = forecast.iter().map(|p| p.point_estimate).fold(f64::MAX, f64::min);
        assert!(highest - lowest < 50.0);
    }

    #[test]
    fn test_holidays_only_when_observed() {
        let start = NaiveDate::from_ymd_opt(2024, 9, 20).unwrap();
        let series = daily(start, (0..30).map(|t| 100.0 + t as f64));
        let params = TrendParams {
            holidays: vec![NaiveDate::from_ymd_opt(2024, 9, 25).unwrap()],
            ..TrendParams::default()
        };
        let mut model = TrendModel::new(params, 0.95);
        model.fit(&series).unwrap();
        assert_eq!(
            model.active_holidays(),
            vec!["national_day".to_string(), "2024-09-25".to_string()]
        );
    }

    #[test]
    fn test_multiplicative_rejects_zero_growth() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = daily(start, std::iter::repeat(0.0).take(20));
        let mut model = TrendModel::new(TrendParams::default(), 0.95);
        assert!(matches!(model.fit(&series), Err(ForecastError::ModelExecution(_))));
        assert_eq!(model.state(), ModelState::Failed);
    }

    #[test]
    fn test_interval_grows_with_horizon() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = daily(start, (0..50).map(|t| 80.0 + ((t * 7919) % 13) as f64));
        let mut model = TrendModel::new(TrendParams::default(), 0.8)
            .with_seasonality_mode(SeasonalityMode::Additive);
        model.fit(&series).unwrap();
        let forecast = model.forecast(10).unwrap();
        assert!(forecast[9].spread() > forecast[0].spread());
    }
}
