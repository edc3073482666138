//! Sequence-learning model: a recurrent network trained on sliding windows
//!
//! A single-layer Elman network (tanh hidden state, linear read-out) maps the
//! last `n_steps` min-max scaled values to the next one. Training uses
//! back-propagation through time with Adam and stops early once the
//! validation loss has not improved for `patience` epochs, keeping the best
//! weights seen. With `dropout` set, each training sample sees the final
//! hidden state through a fresh inverted-dropout mask.
//!
//! Forecasts are produced autoregressively. The interval comes from Monte
//! Carlo paths in which every fed-back value is perturbed by multiplicative
//! Gaussian noise; the per-day percentile band is widened so that it never
//! narrows further out.

use crate::config::SequenceParams;
use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use crate::models::{forecast_dates, require_length, ForecastPoint, Lifecycle, ModelState, PredictorStrategy};
use chrono::NaiveDate;
use forecast_math::scale::MinMaxScaler;
use forecast_math::stats::percentile;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const MAX_GRADIENT_NORM: f64 = 5.0;

/// Elman network with flat weight storage:
/// `[w_x (H) | w_h (H×H, row = target unit) | b_h (H) | w_y (H) | b_y]`
#[derive(Debug, Clone)]
struct Network {
    hidden: usize,
    weights: Vec<f64>,
}

impl Network {
    fn size(hidden: usize) -> usize {
        hidden * (hidden + 3) + 1
    }

    fn init(hidden: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (hidden as f64).sqrt();
        let weights = (0..Self::size(hidden))
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        Self { hidden, weights }
    }

    fn w_x(&self) -> usize {
        0
    }

    fn w_h(&self) -> usize {
        self.hidden
    }

    fn b_h(&self) -> usize {
        self.hidden + self.hidden * self.hidden
    }

    fn w_y(&self) -> usize {
        2 * self.hidden + self.hidden * self.hidden
    }

    fn b_y(&self) -> usize {
        3 * self.hidden + self.hidden * self.hidden
    }

    /// Hidden states `h_0 ..= h_N` for a window of length `N`
    fn forward(&self, window: &[f64]) -> Vec<Vec<f64>> {
        let h = self.hidden;
        let w = &self.weights;
        let mut states = Vec::with_capacity(window.len() + 1);
        states.push(vec![0.0; h]);
        for &x in window {
            let prev = &states[states.len() - 1];
            let next: Vec<f64> = (0..h)
                .map(|i| {
                    let recurrent: f64 = (0..h)
                        .map(|j| w[self.w_h() + i * h + j] * prev[j])
                        .sum();
                    (w[self.w_x() + i] * x + recurrent + w[self.b_h() + i]).tanh()
                })
                .collect();
            states.push(next);
        }
        states
    }

    fn readout(&self, state: &[f64]) -> f64 {
        let w = &self.weights;
        let linear: f64 = state
            .iter()
            .enumerate()
            .map(|(i, s)| w[self.w_y() + i] * s)
            .sum();
        linear + w[self.b_y()]
    }

    fn predict(&self, window: &[f64]) -> f64 {
        let states = self.forward(window);
        self.readout(&states[states.len() - 1])
    }

    /// Add the gradient of `(prediction - target)²` to `grad` and return the
    /// squared error. `mask` scales each unit of the final hidden state
    /// before the read-out.
    fn accumulate_gradient(
        &self,
        window: &[f64],
        target: f64,
        mask: Option<&[f64]>,
        grad: &mut [f64],
    ) -> f64 {
        let h = self.hidden;
        let w = &self.weights;
        let states = self.forward(window);
        let keep = |i: usize| mask.map_or(1.0, |m| m[i]);
        let masked: Vec<f64> = states[states.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, s)| s * keep(i))
            .collect();
        let error = self.readout(&masked) - target;
        let d_out = 2.0 * error;

        for i in 0..h {
            grad[self.w_y() + i] += d_out * masked[i];
        }
        grad[self.b_y()] += d_out;

        let mut d_hidden: Vec<f64> = (0..h).map(|i| d_out * w[self.w_y() + i] * keep(i)).collect();
        for t in (1..states.len()).rev() {
            let current = &states[t];
            let previous = &states[t - 1];
            let d_pre: Vec<f64> = (0..h)
                .map(|i| d_hidden[i] * (1.0 - current[i] * current[i]))
                .collect();
            for i in 0..h {
                grad[self.w_x() + i] += d_pre[i] * window[t - 1];
                grad[self.b_h() + i] += d_pre[i];
                for j in 0..h {
                    grad[self.w_h() + i * h + j] += d_pre[i] * previous[j];
                }
            }
            d_hidden = (0..h)
                .map(|j| (0..h).map(|i| w[self.w_h() + i * h + j] * d_pre[i]).sum())
                .collect();
        }

        error * error
    }

    fn mean_squared_error(&self, samples: &[(&[f64], f64)]) -> f64 {
        if samples.is_empty() {
            return f64::INFINITY;
        }
        let total: f64 = samples
            .iter()
            .map(|(window, target)| (self.predict(window) - target).powi(2))
            .sum();
        total / samples.len() as f64
    }
}

/// Adam optimiser state
#[derive(Debug)]
struct Adam {
    learning_rate: f64,
    first: Vec<f64>,
    second: Vec<f64>,
    step: i32,
}

impl Adam {
    fn new(size: usize, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            first: vec![0.0; size],
            second: vec![0.0; size],
            step: 0,
        }
    }

    fn update(&mut self, weights: &mut [f64], grad: &[f64]) {
        self.step += 1;
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        for (i, g) in grad.iter().enumerate() {
            self.first[i] = BETA1 * self.first[i] + (1.0 - BETA1) * g;
            self.second[i] = BETA2 * self.second[i] + (1.0 - BETA2) * g * g;
            let m = self.first[i] / correction1;
            let v = self.second[i] / correction2;
            weights[i] -= self.learning_rate * m / (v.sqrt() + ADAM_EPSILON);
        }
    }
}

fn clip_norm(grad: &mut [f64], max_norm: f64) {
    let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
    if norm > max_norm {
        let factor = max_norm / norm;
        grad.iter_mut().for_each(|g| *g *= factor);
    }
}

#[derive(Debug, Clone)]
struct FittedSequence {
    network: Network,
    scaler: MinMaxScaler,
    /// Last `n_steps` observations on the scaled axis
    window: Vec<f64>,
    last_date: NaiveDate,
    epochs_run: usize,
}

/// Recurrent sequence-learning model with Monte Carlo intervals
#[derive(Debug, Clone)]
pub struct SequenceModel {
    name: String,
    params: SequenceParams,
    confidence_level: f64,
    lifecycle: Lifecycle,
    fitted: Option<FittedSequence>,
}

impl SequenceModel {
    pub fn new(params: SequenceParams, confidence_level: f64) -> Self {
        Self {
            name: format!("RNN(units={}, steps={})", params.n_units, params.n_steps),
            params,
            confidence_level,
            lifecycle: Lifecycle::new(),
            fitted: None,
        }
    }

    /// Epochs actually trained before early stopping
    pub fn epochs_run(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.epochs_run)
    }

    /// Inverted-dropout mask over the hidden units, `None` without dropout
    fn dropout_mask(&self, rng: &mut StdRng) -> Option<Vec<f64>> {
        let rate = self.params.dropout;
        if rate <= 0.0 {
            return None;
        }
        let kept = 1.0 / (1.0 - rate);
        Some(
            (0..self.params.n_units)
                .map(|_| if rng.gen::<f64>() < rate { 0.0 } else { kept })
                .collect(),
        )
    }

    fn train(&self, scaled: &[f64]) -> Result<(Network, usize)> {
        let n_steps = self.params.n_steps;
        let samples: Vec<(&[f64], f64)> = (0..scaled.len() - n_steps)
            .map(|i| (&scaled[i..i + n_steps], scaled[i + n_steps]))
            .collect();
        let held_out = ((samples.len() as f64) * self.params.validation_split).floor() as usize;
        let held_out = held_out.min(samples.len() - 1);
        let (training, validation) = samples.split_at(samples.len() - held_out);

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut network = Network::init(self.params.n_units, &mut rng);
        let mut adam = Adam::new(network.weights.len(), self.params.learning_rate);
        let mut order: Vec<usize> = (0..training.len()).collect();

        let mut best_loss = f64::INFINITY;
        let mut best = network.clone();
        let mut stale = 0;
        let mut epochs_run = 0;

        for epoch in 0..self.params.epochs {
            epochs_run = epoch + 1;
            order.shuffle(&mut rng);
            for batch in order.chunks(self.params.batch_size) {
                let mut grad = vec![0.0; network.weights.len()];
                for &i in batch {
                    let (window, target) = training[i];
                    let mask = self.dropout_mask(&mut rng);
                    network.accumulate_gradient(window, target, mask.as_deref(), &mut grad);
                }
                let scale = 1.0 / batch.len() as f64;
                grad.iter_mut().for_each(|g| *g *= scale);
                clip_norm(&mut grad, MAX_GRADIENT_NORM);
                adam.update(&mut network.weights, &grad);
            }

            let monitored = if validation.is_empty() {
                network.mean_squared_error(training)
            } else {
                network.mean_squared_error(validation)
            };
            if !monitored.is_finite() {
                return Err(ForecastError::ModelExecution(format!(
                    "{}: loss diverged at epoch {}",
                    self.name, epochs_run
                )));
            }
            debug!(epoch = epochs_run, loss = monitored, "epoch finished");

            if monitored < best_loss {
                best_loss = monitored;
                best = network.clone();
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.params.patience {
                    debug!(epoch = epochs_run, best_loss, "early stopping");
                    break;
                }
            }
        }

        Ok((best, epochs_run))
    }

    fn estimate(&self, series: &HistoricalSeries) -> Result<FittedSequence> {
        require_length(&self.name, series, self.min_observations())?;
        let values = series.values();
        let scaler = MinMaxScaler::fit(&values)?;
        let scaled = scaler.transform_all(&values);
        let (network, epochs_run) = self.train(&scaled)?;
        let window = scaled[scaled.len() - self.params.n_steps..].to_vec();
        Ok(FittedSequence {
            network,
            scaler,
            window,
            last_date: series.last_date(),
            epochs_run,
        })
    }

    /// One autoregressive path in original units. With `noise` every scaled
    /// prediction is multiplied by `1 + ε` before it is fed back.
    fn simulate(
        fitted: &FittedSequence,
        horizon: usize,
        mut noise: Option<(&Normal<f64>, &mut StdRng)>,
    ) -> Vec<f64> {
        let mut window = fitted.window.clone();
        let mut path = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let mut scaled = fitted.network.predict(&window);
            if let Some((dist, rng)) = noise.as_mut() {
                scaled *= 1.0 + dist.sample(&mut **rng);
            }
            path.push(fitted.scaler.inverse(scaled));
            window.remove(0);
            window.push(scaled);
        }
        path
    }

    fn monte_carlo(&self, fitted: &FittedSequence, horizon: usize) -> Result<Vec<Vec<f64>>> {
        let noise = Normal::new(0.0, self.params.noise_level).map_err(|e| {
            ForecastError::InvalidConfig(format!("noise_level: {}", e))
        })?;
        let seed = self.params.mc_seed;
        let paths: Vec<Vec<f64>> = (0..self.params.simulations)
            .into_par_iter()
            .map(|i| {
                let mut rng = match seed {
                    Some(s) => StdRng::seed_from_u64(s.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };
                Self::simulate(fitted, horizon, Some((&noise, &mut rng)))
            })
            .collect();
        Ok(paths)
    }
}

impl PredictorStrategy for SequenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ModelState {
        self.lifecycle.state()
    }

    fn min_observations(&self) -> usize {
        self.params.n_steps + 2
    }

    fn fit(&mut self, series: &HistoricalSeries) -> Result<()> {
        self.lifecycle.begin(&self.name)?;
        info!(model = %self.name, observations = series.len(), "training");
        let outcome = self.estimate(series);
        let fitted = self.lifecycle.finish(outcome)?;
        info!(model = %self.name, epochs = fitted.epochs_run, "training finished");
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

        let estimates = Self::simulate(fitted, horizon, None);
        let paths = self.monte_carlo(fitted, horizon)?;

        let lower_q = (1.0 - self.confidence_level) / 2.0 * 100.0;
        let upper_q = 100.0 - lower_q;
        let mut below = 0.0_f64;
        let mut above = 0.0_f64;
        let mut points = Vec::with_capacity(horizon);
        for (h, (date, estimate)) in dates.into_iter().zip(estimates).enumerate() {
            let column: Vec<f64> = paths.iter().map(|path| path[h]).collect();
            let lower = percentile(&column, lower_q)?;
            let upper = percentile(&column, upper_q)?;
            below = below.max(estimate - lower);
            above = above.max(upper - estimate);
            points.push(ForecastPoint::new(date, estimate, estimate - below, estimate + above));
        }

        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(ForecastError::ModelExecution(format!(
                "{} produced a non-finite forecast for {}",
                self.name, bad.date
            )));
        }
        info!(model = %self.name, horizon, paths = paths.len(), "forecast complete");
        Ok(points)
    }
}
