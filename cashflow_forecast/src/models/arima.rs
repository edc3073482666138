//! ARIMA models for cash-flow forecasting
//!
//! Seasonal terms are additive: a seasonal AR or MA coefficient acts on the
//! value or error `i * s` days back. Coefficients are estimated by
//! conditional sum of squares; intervals come from the MA(∞) weights of the
//! integrated model.

use crate::config::{ArimaOrder, ArimaParams};
use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use crate::models::{forecast_dates, require_length, ForecastPoint, Lifecycle, ModelState, PredictorStrategy};
use chrono::NaiveDate;
use forecast_math::diff::{ar_is_stationary, lag_polynomial, Differenced};
use forecast_math::optimize::{nelder_mead, NelderMeadOptions};
use forecast_math::stats::{dickey_fuller, mean, normal_critical_value, DICKEY_FULLER_5_PERCENT};
use forecast_math::ensure_finite;
use rayon::prelude::*;
use tracing::{debug, info};

/// Largest absolute value an AR or MA coefficient may take
const COEFFICIENT_BOUND: f64 = 0.99;

/// Orders of the ARMA part fitted on the differenced series
#[derive(Debug, Clone, Copy)]
struct ArmaOrders {
    p: usize,
    q: usize,
    seasonal_p: usize,
    seasonal_q: usize,
    period: usize,
}

impl ArmaOrders {
    fn max_lag(&self) -> usize {
        self.p
            .max(self.q)
            .max(self.seasonal_p * self.period)
            .max(self.seasonal_q * self.period)
    }

    /// Intercept plus every AR and MA coefficient
    fn n_parameters(&self) -> usize {
        1 + self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    /// `(lag, coefficient)` pairs of the AR part in `params`
    fn ar_terms<'a>(&self, params: &'a [f64]) -> impl Iterator<Item = (usize, f64)> + 'a {
        let (p, sp, s) = (self.p, self.seasonal_p, self.period);
        let regular = (1..=p).map(move |i| (i, params[i]));
        let seasonal = (1..=sp).map(move |j| (j * s, params[p + j]));
        regular.chain(seasonal)
    }

    /// `(lag, coefficient)` pairs of the MA part in `params`
    fn ma_terms<'a>(&self, params: &'a [f64]) -> impl Iterator<Item = (usize, f64)> + 'a {
        let offset = self.p + self.seasonal_p;
        let (q, sq, s) = (self.q, self.seasonal_q, self.period);
        let regular = (1..=q).map(move |k| (k, params[offset + k]));
        let seasonal = (1..=sq).map(move |l| (l * s, params[offset + q + l]));
        regular.chain(seasonal)
    }

    /// One-step prediction of `w[t]` from everything before `t`.
    /// Values and errors before the start of the series count as zero.
    fn predict_at(&self, params: &[f64], w: &[f64], e: &[f64], t: usize) -> f64 {
        let mut prediction = params[0];
        for (lag, coef) in self.ar_terms(params) {
            if lag <= t {
                prediction += coef * w[t - lag];
            }
        }
        for (lag, coef) in self.ma_terms(params) {
            if lag <= t {
                prediction += coef * e[t - lag];
            }
        }
        prediction
    }

    /// In-sample residuals, zero before the first fully observed lag window
    fn residuals(&self, params: &[f64], w: &[f64]) -> Vec<f64> {
        let mut e = vec![0.0; w.len()];
        for t in self.max_lag()..w.len() {
            e[t] = w[t] - self.predict_at(params, w, &e, t);
        }
        e
    }

    /// Mean squared residual over the conditioned sample
    fn conditional_sum_of_squares(&self, params: &[f64], w: &[f64]) -> f64 {
        self.mean_square_from(params, w, self.max_lag())
    }

    /// Mean squared residual from index `start` onwards
    fn mean_square_from(&self, params: &[f64], w: &[f64], start: usize) -> f64 {
        let n = w.len().saturating_sub(start);
        if n == 0 {
            return f64::INFINITY;
        }
        let e = self.residuals(params, w);
        let sse: f64 = e[start..].iter().map(|r| r * r).sum();
        let mse = sse / n as f64;
        if mse.is_finite() {
            mse
        } else {
            f64::INFINITY
        }
    }

    /// Coefficients of the AR polynomial `1 - Σ a_lag B^lag`
    fn ar_polynomial(&self, params: &[f64]) -> Vec<f64> {
        let mut poly = vec![0.0; self.max_lag() + 1];
        poly[0] = 1.0;
        for (lag, coef) in self.ar_terms(params) {
            poly[lag] -= coef;
        }
        poly
    }

    /// `phi` of the expanded AR part, `w_t = Σ phi[i] w_{t-1-i} + ...`
    fn ar_coefficients(&self, params: &[f64]) -> Vec<f64> {
        self.ar_polynomial(params)[1..].iter().map(|c| -c).collect()
    }

    /// Coefficients of the MA polynomial `1 + Σ b_lag B^lag`
    fn ma_polynomial(&self, params: &[f64]) -> Vec<f64> {
        let mut poly = vec![0.0; self.max_lag() + 1];
        poly[0] = 1.0;
        for (lag, coef) in self.ma_terms(params) {
            poly[lag] += coef;
        }
        poly
    }
}

fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// First `count` weights of `ψ(B) = θ(B) / φ(B)`
fn psi_weights(ar: &[f64], ma: &[f64], count: usize) -> Vec<f64> {
    let mut psi = Vec::with_capacity(count);
    for j in 0..count {
        let mut value = ma.get(j).copied().unwrap_or(0.0);
        for i in 1..=j.min(ar.len().saturating_sub(1)) {
            value -= ar[i] * psi[j - i];
        }
        psi.push(value);
    }
    psi
}

/// Candidate AR and MA orders searched when the order is `"auto"`
const AUTO_ORDER_MAX: usize = 2;

/// Everything `forecast` needs from a successful fit
#[derive(Debug, Clone)]
struct FittedArima {
    orders: ArmaOrders,
    d: usize,
    differenced: Differenced,
    params: Vec<f64>,
    residuals: Vec<f64>,
    sigma2: f64,
    last_date: NaiveDate,
}

/// Coefficients and innovation variance of one CSS fit
#[derive(Debug, Clone)]
struct Estimate {
    params: Vec<f64>,
    sigma2: f64,
}

/// ARIMA model (AutoRegressive Integrated Moving Average)
#[derive(Debug, Clone)]
pub struct ArimaModel {
    /// Name of the model, updated with the selected order after an automatic fit
    name: String,
    params: ArimaParams,
    confidence_level: f64,
    lifecycle: Lifecycle,
    fitted: Option<FittedArima>,
}

fn model_name(order: Option<(usize, usize, usize)>, seasonal: (usize, usize, usize, usize)) -> String {
    let regular = match order {
        Some((p, d, q)) => format!("ARIMA({},{},{})", p, d, q),
        None => "ARIMA(auto)".to_string(),
    };
    let (sp, sd, sq, s) = seasonal;
    if sp + sd + sq > 0 {
        format!("{}({},{},{}){}", regular, sp, sd, sq, s)
    } else {
        regular
    }
}

impl ArimaModel {
    /// Create an unfit model
    pub fn new(params: ArimaParams, confidence_level: f64) -> Self {
        let order = match params.order {
            ArimaOrder::Fixed(p, d, q) => Some((p, d, q)),
            ArimaOrder::Auto => None,
        };
        Self {
            name: model_name(order, params.seasonal_order),
            params,
            confidence_level,
            lifecycle: Lifecycle::new(),
            fitted: None,
        }
    }

    /// Fitted coefficients: intercept, AR, seasonal AR, MA, seasonal MA
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.params.as_slice())
    }

    /// Innovation variance estimated during the fit
    pub fn innovation_variance(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.sigma2)
    }

    /// Non-seasonal `(p, d, q)` used by the fit, selected or configured
    pub fn order(&self) -> Option<(usize, usize, usize)> {
        self.fitted.as_ref().map(|f| (f.orders.p, f.d, f.orders.q))
    }

    fn arma_orders(&self, p: usize, q: usize) -> ArmaOrders {
        let (sp, _, sq, s) = self.params.seasonal_order;
        ArmaOrders {
            p,
            q,
            seasonal_p: sp,
            seasonal_q: sq,
            period: s.max(1),
        }
    }

    /// Largest `(p, d, q)` this configuration can fit
    fn widest_order(&self) -> (usize, usize, usize) {
        match self.params.order {
            ArimaOrder::Fixed(p, d, q) => (p, d, q),
            ArimaOrder::Auto => (AUTO_ORDER_MAX, 2, AUTO_ORDER_MAX),
        }
    }

    /// Regular differencing order: the first of 0, 1, 2 whose result passes
    /// the Dickey-Fuller test, applied after any seasonal differencing
    fn select_differencing(&self, values: &[f64]) -> Result<(Differenced, usize)> {
        let (_, sd, _, s) = self.params.seasonal_order;
        for d in 0..2 {
            let candidate = Differenced::new(values, d, sd, s)?;
            let statistic = dickey_fuller(candidate.series())?;
            debug!(model = %self.name, d, statistic, "stationarity check");
            if statistic < DICKEY_FULLER_5_PERCENT {
                return Ok((candidate, d));
            }
        }
        Ok((Differenced::new(values, 2, sd, s)?, 2))
    }

    /// Minimise the conditional sum of squares for one set of orders
    fn estimate_orders(&self, orders: ArmaOrders, w: &[f64]) -> Result<Estimate> {
        let n_params = orders.n_parameters();
        let level = mean(w).unwrap_or(0.0);
        let scale = w.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) * 10.0 + 1.0;

        let mut initial = vec![0.0; n_params];
        initial[0] = level;
        let mut bounds = vec![(-COEFFICIENT_BOUND, COEFFICIENT_BOUND); n_params];
        bounds[0] = (-scale, scale);

        let options = NelderMeadOptions {
            max_iterations: self.params.max_iterations,
            ..NelderMeadOptions::default()
        };
        let enforce = self.params.enforce_stationarity;
        let minimum = nelder_mead(
            |x| {
                if enforce && !ar_is_stationary(&orders.ar_coefficients(x)) {
                    return f64::INFINITY;
                }
                orders.conditional_sum_of_squares(x, w)
            },
            &initial,
            Some(&bounds),
            options,
        )?;

        if !minimum.value.is_finite() {
            return Err(ForecastError::ModelExecution(format!(
                "{}: conditional sum of squares did not converge to a finite value",
                self.name
            )));
        }
        ensure_finite(&minimum.point, "ARIMA coefficient search")?;
        debug!(
            model = %self.name,
            p = orders.p,
            q = orders.q,
            iterations = minimum.iterations,
            converged = minimum.converged,
            sigma2 = minimum.value,
            "coefficient search finished"
        );
        Ok(Estimate {
            params: minimum.point,
            sigma2: minimum.value,
        })
    }

    /// Fit every `(p, q)` in `0..=2` and keep the lowest
    /// `AIC = n ln σ² + 2k`, all candidates scored on the same sample
    fn select_orders(&self, w: &[f64]) -> Result<(ArmaOrders, Estimate)> {
        let candidates: Vec<ArmaOrders> = (0..=AUTO_ORDER_MAX)
            .flat_map(|p| (0..=AUTO_ORDER_MAX).map(move |q| (p, q)))
            .map(|(p, q)| self.arma_orders(p, q))
            .collect();
        let start = candidates.iter().map(ArmaOrders::max_lag).max().unwrap_or(0);
        let n = w.len().saturating_sub(start) as f64;

        let scored: Vec<Option<(f64, ArmaOrders, Estimate)>> = candidates
            .par_iter()
            .map(|&orders| {
                let estimate = self.estimate_orders(orders, w).ok()?;
                let sigma2 = orders.mean_square_from(&estimate.params, w, start);
                let aic = n * sigma2.ln() + 2.0 * orders.n_parameters() as f64;
                aic.is_finite().then_some((aic, orders, estimate))
            })
            .collect();

        let (aic, orders, estimate) = scored
            .into_iter()
            .flatten()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .ok_or_else(|| {
                ForecastError::ModelExecution(format!("{}: no candidate order could be fitted", self.name))
            })?;
        info!(model = %self.name, p = orders.p, q = orders.q, aic, "order selected");
        Ok((orders, estimate))
    }

    fn estimate(&self, series: &HistoricalSeries) -> Result<FittedArima> {
        require_length(&self.name, series, self.min_observations())?;

        let values = series.values();
        let (_, sd, _, s) = self.params.seasonal_order;
        let (differenced, d) = match self.params.order {
            ArimaOrder::Fixed(_, d, _) => (Differenced::new(&values, d, sd, s)?, d),
            ArimaOrder::Auto => self.select_differencing(&values)?,
        };
        let w = differenced.series().to_vec();

        let (orders, estimate) = match self.params.order {
            ArimaOrder::Fixed(p, _, q) => {
                let orders = self.arma_orders(p, q);
                (orders, self.estimate_orders(orders, &w)?)
            }
            ArimaOrder::Auto => self.select_orders(&w)?,
        };

        let residuals = orders.residuals(&estimate.params, &w);
        Ok(FittedArima {
            orders,
            d,
            differenced,
            params: estimate.params,
            residuals,
            sigma2: estimate.sigma2,
            last_date: series.last_date(),
        })
    }
}

impl PredictorStrategy for ArimaModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ModelState {
        self.lifecycle.state()
    }

    fn min_observations(&self) -> usize {
        let (p, d, q) = self.widest_order();
        let (_, sd, _, s) = self.params.seasonal_order;
        let orders = self.arma_orders(p, q);
        d + sd * s + orders.max_lag() + orders.n_parameters() + 1
    }

    fn fit(&mut self, series: &HistoricalSeries) -> Result<()> {
        self.lifecycle.begin(&self.name)?;
        info!(model = %self.name, observations = series.len(), "fitting");
        let outcome = self.estimate(series);
        let fitted = self.lifecycle.finish(outcome)?;
        if self.params.order == ArimaOrder::Auto {
            self.name = model_name(
                Some((fitted.orders.p, fitted.d, fitted.orders.q)),
                self.params.seasonal_order,
            );
        }
        self.fitted = Some(fitted);
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<ForecastPoint>> {
        self.lifecycle.ensure_fit(&self.name)?;
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted(self.name.clone()))?;
        let dates = forecast_dates(fitted.last_date, horizon)?;

        let orders = fitted.orders;
        let mut w = fitted.differenced.series().to_vec();
        let mut e = fitted.residuals.clone();
        let n = w.len();
        for t in n..n + horizon {
            let next = orders.predict_at(&fitted.params, &w, &e, t);
            w.push(next);
            e.push(0.0);
        }
        let estimates = fitted.differenced.integrate(&w[n..]);
        ensure_finite(&estimates, "ARIMA forecast")?;

        let ar = multiply(
            &orders.ar_polynomial(&fitted.params),
            &lag_polynomial(fitted.differenced.lags()),
        );
        let psi = psi_weights(&ar, &orders.ma_polynomial(&fitted.params), horizon);
        let z = normal_critical_value(self.confidence_level)?;

        let mut cumulative = 0.0;
        let points = dates
            .into_iter()
            .zip(estimates)
            .zip(psi)
            .map(|((date, estimate), weight)| {
                cumulative += weight * weight;
                ForecastPoint::symmetric(date, estimate, z * (fitted.sigma2 * cumulative).sqrt())
            })
            .collect();

        info!(model = %self.name, horizon, "forecast complete");
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeSeriesPoint;
    use approx::assert_relative_eq;

    fn series(values: &[f64]) -> HistoricalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| TimeSeriesPoint::new(start + chrono::Duration::days(i as i64), v))
            .collect();
        HistoricalSeries::prepare("m-1", points).unwrap()
    }

    #[test]
    fn test_psi_weights_of_random_walk() {
        // (1 - B) y = e  =>  ψ_j = 1 for every j
        let psi = psi_weights(&[1.0, -1.0], &[1.0], 4);
        assert_eq!(psi, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_psi_weights_of_ar1() {
        let psi = psi_weights(&[1.0, -0.5], &[1.0], 3);
        assert_relative_eq!(psi[2], 0.25);
    }

    #[test]
    fn test_constant_drift_is_extrapolated() {
        let values: Vec<f64> = (0..40).map(|t| 50.0 + 3.0 * t as f64).collect();
        let mut model = ArimaModel::new(ArimaParams::default(), 0.95);
        model.fit(&series(&values)).unwrap();

        let forecast = model.forecast(5).unwrap();
        for (h, point) in forecast.iter().enumerate() {
            let expected = 50.0 + 3.0 * (40 + h) as f64;
            assert_relative_eq!(point.point_estimate, expected, max_relative = 0.01);
        }
    }

    #[test]
    fn test_interval_widens_with_horizon() {
        let values: Vec<f64> = (0..60)
            .map(|t| 100.0 + 10.0 * ((t as f64) * 0.7).sin() + (t % 5) as f64)
            .collect();
        let mut model = ArimaModel::new(ArimaParams::default(), 0.9);
        model.fit(&series(&values)).unwrap();

        let forecast = model.forecast(10).unwrap();
        for pair in forecast.windows(2) {
            assert!(pair[1].spread() >= pair[0].spread() - 1e-9);
        }
    }

    #[test]
    fn test_seasonal_name_and_minimum() {
        let params = ArimaParams {
            order: ArimaOrder::Fixed(1, 0, 0),
            seasonal_order: (1, 1, 0, 7),
            max_iterations: 200,
            enforce_stationarity: false,
        };
        let model = ArimaModel::new(params, 0.95);
        assert_eq!(model.name(), "ARIMA(1,0,0)(1,1,0)7");
        assert_eq!(model.min_observations(), 7 + 7 + 3 + 1);
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut level = 100.0;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                level += (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0;
                level
            })
            .collect()
    }

    #[test]
    fn test_auto_order_differences_a_random_walk_once() {
        let params = ArimaParams {
            order: ArimaOrder::Auto,
            ..ArimaParams::default()
        };
        let mut model = ArimaModel::new(params, 0.95);
        assert_eq!(model.name(), "ARIMA(auto)");
        assert_eq!(model.order(), None);

        model.fit(&series(&random_walk(150, 7))).unwrap();
        let (p, d, q) = model.order().unwrap();
        assert_eq!(d, 1);
        assert!(p <= 2 && q <= 2);
        assert_eq!(model.name(), format!("ARIMA({},{},{})", p, d, q));
        assert_eq!(model.coefficients().unwrap().len(), 1 + p + q);
        assert!(model.forecast(7).unwrap().iter().all(|pt| pt.point_estimate.is_finite()));
    }

    #[test]
    fn test_auto_order_keeps_stationary_series_undifferenced() {
        let values: Vec<f64> = (0..120).map(|i| 100.0 + ((i * 7919) % 13) as f64 - 6.0).collect();
        let mut model = ArimaModel::new(
            ArimaParams {
                order: ArimaOrder::Auto,
                ..ArimaParams::default()
            },
            0.95,
        );
        model.fit(&series(&values)).unwrap();
        assert_eq!(model.order().map(|(_, d, _)| d), Some(0));
    }

    #[test]
    fn test_enforced_stationarity_constrains_ar_part() {
        let values: Vec<f64> = (0..80)
            .map(|t| 200.0 + 2.5 * t as f64 + 6.0 * (t as f64 / 3.0).sin())
            .collect();
        let params = ArimaParams {
            order: ArimaOrder::Fixed(2, 0, 0),
            enforce_stationarity: true,
            ..ArimaParams::default()
        };
        let mut model = ArimaModel::new(params, 0.95);
        model.fit(&series(&values)).unwrap();

        let coefficients = model.coefficients().unwrap();
        assert!(ar_is_stationary(&coefficients[1..3]));
        assert!(model.forecast(10).unwrap().iter().all(|pt| pt.spread().is_finite()));
    }

    #[test]
    fn test_short_series_fails_and_stays_failed() {
        let mut model = ArimaModel::new(ArimaParams::default(), 0.95);
        assert!(matches!(
            model.fit(&series(&[1.0, 2.0, 3.0])),
            Err(ForecastError::DataError(_))
        ));
        assert_eq!(model.state(), ModelState::Failed);
        assert!(matches!(model.forecast(3), Err(ForecastError::NotFitted(_))));
    }
}
