//! Weighted ensemble of forecasting strategies
//!
//! Members are fitted and asked for forecasts in parallel. A member that
//! returns an error or panics is dropped and the weights of the remaining
//! members are rescaled to sum to one. Point estimates and both bounds are
//! averaged independently with the same weights.

use crate::data::HistoricalSeries;
use crate::error::{ForecastError, Result};
use crate::models::{isolate, BoxedStrategy, ForecastPoint, Lifecycle, ModelState, PredictorStrategy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Normalised member weights keyed by member label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeights(BTreeMap<String, f64>);

impl EnsembleWeights {
    /// Equal weight for every label
    pub fn uniform<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        if labels.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "Cannot weight an empty ensemble".to_string(),
            ));
        }
        let share = 1.0 / labels.len() as f64;
        Ok(Self(
            labels
                .iter()
                .map(|l| (l.as_ref().to_string(), share))
                .collect(),
        ))
    }

    /// Scale raw weights to sum to one
    pub fn normalized(raw: BTreeMap<String, f64>) -> Result<Self> {
        if raw.values().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForecastError::InvalidConfig(
                "Ensemble weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = raw.values().sum();
        if total <= 0.0 {
            return Err(ForecastError::InvalidConfig(
                "Ensemble weights must not all be zero".to_string(),
            ));
        }
        Ok(Self(raw.into_iter().map(|(k, w)| (k, w / total)).collect()))
    }

    /// Keep only `survivors` and rescale them to sum to one.
    ///
    /// Survivors whose weights are all zero share the mass equally.
    pub fn renormalized<S: AsRef<str>>(&self, survivors: &[S]) -> Result<Self> {
        let kept: BTreeMap<String, f64> = survivors
            .iter()
            .map(|s| {
                let label = s.as_ref();
                (label.to_string(), self.get(label).unwrap_or(0.0))
            })
            .collect();
        if kept.values().sum::<f64>() > 0.0 {
            Self::normalized(kept)
        } else {
            Self::uniform(survivors)
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, w)| (k.as_str(), *w))
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

#[derive(Debug)]
struct Member {
    label: String,
    strategy: BoxedStrategy,
}

/// Combined forecast together with the weights that produced it
#[derive(Debug, Clone)]
pub struct EnsembleForecast {
    pub points: Vec<ForecastPoint>,
    pub weights: EnsembleWeights,
    /// `label: error` for every member left out of this forecast
    pub failures: Vec<String>,
}

/// Coordinates fitting and forecasting of several strategies
#[derive(Debug)]
pub struct EnsembleCoordinator {
    members: Vec<Member>,
    configured: EnsembleWeights,
    active: Option<EnsembleWeights>,
    fit_failures: Vec<String>,
    lifecycle: Lifecycle,
}

impl EnsembleCoordinator {
    /// Ensemble with uniform weights
    pub fn new(members: Vec<(String, BoxedStrategy)>) -> Result<Self> {
        let labels: Vec<String> = members.iter().map(|(l, _)| l.clone()).collect();
        let weights = EnsembleWeights::uniform(&labels)?;
        Self::build(members, weights)
    }

    /// Ensemble with caller weights, normalised here.
    ///
    /// Every member needs a weight and every weight needs a member.
    pub fn with_weights(members: Vec<(String, BoxedStrategy)>, weights: BTreeMap<String, f64>) -> Result<Self> {
        if let Some((label, _)) = members.iter().find(|(l, _)| !weights.contains_key(l)) {
            return Err(ForecastError::InvalidConfig(format!(
                "No ensemble weight given for {}",
                label
            )));
        }
        if let Some(label) = weights.keys().find(|k| !members.iter().any(|(l, _)| l == *k)) {
            return Err(ForecastError::InvalidConfig(format!(
                "Ensemble weight given for unknown member {}",
                label
            )));
        }
        let weights = EnsembleWeights::normalized(weights)?;
        Self::build(members, weights)
    }

    fn build(members: Vec<(String, BoxedStrategy)>, configured: EnsembleWeights) -> Result<Self> {
        let mut seen = Vec::with_capacity(members.len());
        for (label, _) in &members {
            if seen.contains(&label) {
                return Err(ForecastError::InvalidConfig(format!(
                    "Duplicate ensemble member {}",
                    label
                )));
            }
            seen.push(label);
        }
        Ok(Self {
            members: members
                .into_iter()
                .map(|(label, strategy)| Member { label, strategy })
                .collect(),
            configured,
            active: None,
            fit_failures: Vec::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Member labels in construction order
    pub fn member_labels(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.label.as_str()).collect()
    }

    /// Weights as configured, over every member
    pub fn configured_weights(&self) -> &EnsembleWeights {
        &self.configured
    }

    /// Weights over the members that survived fitting
    pub fn weights(&self) -> Option<&EnsembleWeights> {
        self.active.as_ref()
    }

    /// Members dropped during fitting, as `label: error`
    pub fn fit_failures(&self) -> &[String] {
        &self.fit_failures
    }

    fn fit_members(&mut self, series: &HistoricalSeries) -> Result<EnsembleWeights> {
        let outcomes: Vec<(String, Result<()>)> = self
            .members
            .par_iter_mut()
            .map(|member| {
                let label = member.label.clone();
                let strategy = &mut member.strategy;
                let outcome = isolate(&label, || strategy.fit(series));
                (label, outcome)
            })
            .collect();

        let mut survivors = Vec::new();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(()) => survivors.push(label),
                Err(e) => {
                    warn!(member = %label, error = %e, "ensemble member failed to fit; excluding it");
                    self.fit_failures.push(format!("{}: {}", label, e));
                }
            }
        }

        if survivors.is_empty() {
            return Err(ForecastError::AllModelsFailed(self.fit_failures.clone()));
        }
        self.configured.renormalized(&survivors)
    }

    /// Forecast with every fitted member and report the weights used
    pub fn forecast_detailed(&self, horizon: usize) -> Result<EnsembleForecast> {
        self.lifecycle.ensure_fit("ensemble")?;
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| ForecastError::NotFitted("ensemble".to_string()))?;

        let outcomes: Vec<(&str, Result<Vec<ForecastPoint>>)> = self
            .members
            .par_iter()
            .filter(|m| active.get(&m.label).is_some())
            .map(|member| {
                let outcome = isolate(&member.label, || member.strategy.forecast(horizon));
                (member.label.as_str(), outcome)
            })
            .collect();

        let mut failures = Vec::new();
        let mut forecasts: Vec<(&str, Vec<ForecastPoint>)> = Vec::new();
        for (label, outcome) in outcomes {
            let checked = outcome.and_then(|points| {
                if points.len() != horizon {
                    return Err(ForecastError::ModelExecution(format!(
                        "returned {} points for a horizon of {}",
                        points.len(),
                        horizon
                    )));
                }
                if let Some((_, reference)) = forecasts.first() {
                    let aligned = reference.iter().zip(&points).all(|(a, b)| a.date == b.date);
                    if !aligned {
                        return Err(ForecastError::ModelExecution(
                            "forecast dates differ from the other members".to_string(),
                        ));
                    }
                }
                Ok(points)
            });
            match checked {
                Ok(points) => forecasts.push((label, points)),
                Err(e) => {
                    warn!(member = %label, error = %e, "ensemble member failed to forecast; excluding it");
                    failures.push(format!("{}: {}", label, e));
                }
            }
        }

        if forecasts.is_empty() {
            let mut all = self.fit_failures.clone();
            all.extend(failures);
            return Err(ForecastError::AllModelsFailed(all));
        }

        let labels: Vec<&str> = forecasts.iter().map(|(l, _)| *l).collect();
        let weights = active.renormalized(&labels)?;
        let reference = &forecasts[0].1;
        let points = (0..horizon)
            .map(|h| {
                let (mut point, mut lower, mut upper) = (0.0, 0.0, 0.0);
                for (label, member_points) in &forecasts {
                    let w = weights.get(label).unwrap_or(0.0);
                    point += w * member_points[h].point_estimate;
                    lower += w * member_points[h].lower_bound;
                    upper += w * member_points[h].upper_bound;
                }
                ForecastPoint::new(reference[h].date, point, lower, upper)
            })
            .collect();

        Ok(EnsembleForecast {
            points,
            weights,
            failures,
        })
    }
}

impl PredictorStrategy for EnsembleCoordinator {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn state(&self) -> ModelState {
        self.lifecycle.state()
    }

    /// The smallest member requirement: larger members fail and are dropped
    fn min_observations(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.strategy.min_observations())
            .min()
            .unwrap_or(1)
    }

    fn fit(&mut self, series: &HistoricalSeries) -> Result<()> {
        self.lifecycle.begin("ensemble")?;
        info!(members = self.members.len(), observations = series.len(), "fitting ensemble");
        let outcome = self.fit_members(series);
        let weights = self.lifecycle.finish(outcome)?;
        info!(survivors = weights.len(), "ensemble fitted");
        self.active = Some(weights);
        Ok(())
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<ForecastPoint>> {
        self.forecast_detailed(horizon).map(|f| f.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeSeriesPoint;
    use crate::models::forecast_dates;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    /// Flat forecast at `level` with a fixed half-width
    #[derive(Debug)]
    struct Constant {
        level: f64,
        fail_fit: bool,
        lifecycle: Lifecycle,
        last: Option<NaiveDate>,
    }

    impl Constant {
        fn boxed(level: f64, fail_fit: bool) -> BoxedStrategy {
            Box::new(Self {
                level,
                fail_fit,
                lifecycle: Lifecycle::new(),
                last: None,
            })
        }
    }

    impl PredictorStrategy for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn state(&self) -> ModelState {
            self.lifecycle.state()
        }
        fn min_observations(&self) -> usize {
            2
        }
        fn fit(&mut self, series: &HistoricalSeries) -> Result<()> {
            self.lifecycle.begin("constant")?;
            if self.fail_fit {
                panic!("constant member exploded");
            }
            self.last = Some(series.last_date());
            self.lifecycle.finish(Ok(()))
        }
        fn forecast(&self, horizon: usize) -> Result<Vec<ForecastPoint>> {
            self.lifecycle.ensure_fit("constant")?;
            let last = self.last.ok_or_else(|| ForecastError::NotFitted("constant".into()))?;
            Ok(forecast_dates(last, horizon)?
                .into_iter()
                .map(|d| ForecastPoint::symmetric(d, self.level, 1.0))
                .collect())
        }
    }

    fn series() -> HistoricalSeries {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let points = (0..10)
            .map(|i| TimeSeriesPoint::new(start + chrono::Duration::days(i), 10.0))
            .collect();
        HistoricalSeries::prepare("m-1", points).unwrap()
    }

    #[test]
    fn test_weights_normalized_at_construction() {
        let raw = BTreeMap::from([("a".to_string(), 2.0), ("b".to_string(), 6.0)]);
        let weights = EnsembleWeights::normalized(raw).unwrap();
        assert_relative_eq!(weights.get("a").unwrap(), 0.25);
        assert_relative_eq!(weights.total(), 1.0);
    }

    #[test]
    fn test_renormalize_zero_survivors_share_equally() {
        let raw = BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), 0.0), ("c".to_string(), 0.0)]);
        let weights = EnsembleWeights::normalized(raw).unwrap();
        let kept = weights.renormalized(&["b", "c"]).unwrap();
        assert_relative_eq!(kept.get("b").unwrap(), 0.5);
    }

    #[test]
    fn test_weighted_combination() {
        let members = vec![
            ("low".to_string(), Constant::boxed(10.0, false)),
            ("high".to_string(), Constant::boxed(20.0, false)),
        ];
        let weights = BTreeMap::from([("low".to_string(), 3.0), ("high".to_string(), 1.0)]);
        let mut ensemble = EnsembleCoordinator::with_weights(members, weights).unwrap();
        ensemble.fit(&series()).unwrap();

        let forecast = ensemble.forecast(3).unwrap();
        assert_relative_eq!(forecast[0].point_estimate, 12.5);
        assert_relative_eq!(forecast[0].lower_bound, 11.5);
        assert_relative_eq!(forecast[0].upper_bound, 13.5);
    }

    #[test]
    fn test_panicking_member_is_excluded() {
        let members = vec![
            ("a".to_string(), Constant::boxed(10.0, false)),
            ("b".to_string(), Constant::boxed(99.0, true)),
        ];
        let mut ensemble = EnsembleCoordinator::new(members).unwrap();
        ensemble.fit(&series()).unwrap();

        assert_eq!(ensemble.fit_failures().len(), 1);
        assert!(ensemble.fit_failures()[0].contains("exploded"));
        assert_relative_eq!(ensemble.weights().unwrap().get("a").unwrap(), 1.0);
        assert_relative_eq!(ensemble.forecast(2).unwrap()[1].point_estimate, 10.0);
    }

    #[test]
    fn test_all_members_failing() {
        let members = vec![
            ("a".to_string(), Constant::boxed(1.0, true)),
            ("b".to_string(), Constant::boxed(2.0, true)),
        ];
        let mut ensemble = EnsembleCoordinator::new(members).unwrap();
        match ensemble.fit(&series()) {
            Err(ForecastError::AllModelsFailed(reasons)) => assert_eq!(reasons.len(), 2),
            other => panic!("expected AllModelsFailed, got {:?}", other),
        }
        assert_eq!(ensemble.state(), ModelState::Failed);
    }

    #[test]
    fn test_missing_weight_rejected() {
        let members = vec![
            ("a".to_string(), Constant::boxed(1.0, false)),
            ("b".to_string(), Constant::boxed(2.0, false)),
        ];
        let weights = BTreeMap::from([("a".to_string(), 1.0)]);
        assert!(matches!(
            EnsembleCoordinator::with_weights(members, weights),
            Err(ForecastError::InvalidConfig(_))
        ));
    }
}
