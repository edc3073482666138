//! Small dense linear algebra for least-squares fitting

use crate::{MathError, Result};

/// Solve `A x = b` for a symmetric positive definite `A` by Cholesky
/// decomposition.
pub fn solve_cholesky(a: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(MathError::InvalidInput(format!(
            "Cholesky solve needs a square {}x{} system",
            n, n
        )));
    }

    // A = L L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(MathError::CalculationError(
                        "Matrix is singular or not positive definite".to_string(),
                    ));
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Ok(x)
}

/// Penalised least squares: minimise `|y - X β|² + Σ penalty_j β_j²`.
///
/// `design` holds one row per observation. `penalties` has one entry per
/// column; zero leaves a column unpenalised.
pub fn ridge_least_squares(design: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    if design.len() != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but target has {} values",
            design.len(),
            y.len()
        )));
    }
    let k = penalties.len();
    if design.iter().any(|row| row.len() != k) {
        return Err(MathError::InvalidInput(format!(
            "Every design row must have {} columns",
            k
        )));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in design.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..=i {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
        xtx[i][i] += penalties[i];
    }

    solve_cholesky(&xtx, &xty)
}

/// Dot product of a design row with coefficients
pub fn dot(row: &[f64], coefficients: &[f64]) -> f64 {
    row.iter().zip(coefficients).map(|(x, b)| x * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_cholesky() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = solve_cholesky(&a, &[2.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let a = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(matches!(
            solve_cholesky(&a, &[1.0, 1.0]),
            Err(MathError::CalculationError(_))
        ));
    }

    #[test]
    fn test_least_squares_recovers_line() {
        let design: Vec<Vec<f64>> = (0..20).map(|t| vec![1.0, t as f64]).collect();
        let y: Vec<f64> = (0..20).map(|t| 3.0 + 0.5 * t as f64).collect();
        let beta = ridge_least_squares(&design, &y, &[0.0, 0.0]).unwrap();
        assert_relative_eq!(beta[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(beta[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(dot(&design[4], &beta), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_penalty_shrinks_coefficient() {
        let design: Vec<Vec<f64>> = (0..10).map(|t| vec![1.0, (t % 2) as f64]).collect();
        let y: Vec<f64> = (0..10).map(|t| (t % 2) as f64 * 4.0).collect();
        let free = ridge_least_squares(&design, &y, &[0.0, 0.0]).unwrap();
        let shrunk = ridge_least_squares(&design, &y, &[0.0, 100.0]).unwrap();
        assert!(shrunk[1].abs() < free[1].abs());
    }
}
