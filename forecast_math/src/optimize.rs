//! Derivative-free minimisation for model parameter estimation

use crate::{MathError, Result};

/// Settings for the Nelder-Mead simplex search
#[derive(Debug, Clone, Copy)]
pub struct NelderMeadOptions {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Stop when the spread of objective values drops below this
    pub tolerance: f64,
    /// Initial simplex step relative to each coordinate (absolute when the coordinate is zero)
    pub initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
            initial_step: 0.05,
        }
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Best point found
    pub point: Vec<f64>,
    /// Objective at `point`
    pub value: f64,
    /// Iterations used
    pub iterations: usize,
    /// Whether the tolerance was reached before the iteration cap
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

fn clamp(point: &mut [f64], bounds: Option<&[(f64, f64)]>) {
    if let Some(bounds) = bounds {
        for (x, (lo, hi)) in point.iter_mut().zip(bounds) {
            *x = x.clamp(*lo, *hi);
        }
    }
}

fn towards(from: &[f64], to: &[f64], factor: f64) -> Vec<f64> {
    from.iter().zip(to).map(|(a, b)| a + factor * (b - a)).collect()
}

/// Minimise `objective` starting from `initial`, keeping every coordinate
/// inside the optional `(min, max)` bounds.
///
/// Fails when the objective is not finite at the starting point.
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    options: NelderMeadOptions,
) -> Result<Minimum>
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return Err(MathError::InvalidInput(
            "Cannot optimise over zero parameters".to_string(),
        ));
    }
    if let Some(b) = bounds {
        if b.len() != n {
            return Err(MathError::InvalidInput(format!(
                "Expected {} bounds, got {}",
                n,
                b.len()
            )));
        }
    }

    let mut start = initial.to_vec();
    clamp(&mut start, bounds);
    let start_value = objective(&start);
    if !start_value.is_finite() {
        return Err(MathError::CalculationError(
            "Objective is not finite at the starting point".to_string(),
        ));
    }

    let mut simplex = vec![start.clone()];
    for i in 0..n {
        let mut vertex = start.clone();
        vertex[i] += if start[i].abs() > 1e-10 {
            options.initial_step * start[i].abs()
        } else {
            options.initial_step
        };
        clamp(&mut vertex, bounds);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| objective(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if (values[n] - values[0]).abs() < options.tolerance {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for vertex in &simplex[..n] {
            for (c, x) in centroid.iter_mut().zip(vertex) {
                *c += x / n as f64;
            }
        }

        let mut reflected = towards(&centroid, &simplex[n], -REFLECT);
        clamp(&mut reflected, bounds);
        let reflected_value = objective(&reflected);

        if reflected_value < values[0] {
            let mut expanded = towards(&centroid, &simplex[n], -EXPAND);
            clamp(&mut expanded, bounds);
            let expanded_value = objective(&expanded);
            if expanded_value < reflected_value {
                simplex[n] = expanded;
                values[n] = expanded_value;
            } else {
                simplex[n] = reflected;
                values[n] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[n - 1] {
            simplex[n] = reflected;
            values[n] = reflected_value;
            continue;
        }

        let contracted = towards(&centroid, &simplex[n], CONTRACT);
        let contracted_value = objective(&contracted);
        if contracted_value < values[n] {
            simplex[n] = contracted;
            values[n] = contracted_value;
            continue;
        }

        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = towards(&best, &simplex[i], SHRINK);
            values[i] = objective(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    Ok(Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quadratic_bowl() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
            &[0.0, 0.0],
            None,
            NelderMeadOptions::default(),
        )
        .unwrap();
        assert!(result.converged);
        assert_abs_diff_eq!(result.point[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.point[1], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bounds_are_respected() {
        let bounds = [(-0.5, 0.5)];
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2),
            &[0.0],
            Some(&bounds),
            NelderMeadOptions::default(),
        )
        .unwrap();
        assert!(result.point[0] <= 0.5);
        assert_abs_diff_eq!(result.point[0], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_non_finite_start() {
        let result = nelder_mead(|_| f64::NAN, &[1.0], None, NelderMeadOptions::default());
        assert!(matches!(result, Err(MathError::CalculationError(_))));
    }
}
