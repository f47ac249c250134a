//! Linear least squares solvers.
//!
//! The regression code solves small dense problems of the form
//!
//! ```text
//! minimize ||X β - y||^2 (+ Σ p_j β_j^2)
//! ```
//!
//! in two places: the linear initialization of a function train and every core
//! update of alternating least squares. Both are tall (many more samples than
//! unknowns) and may be rank deficient when several univariate functions of a
//! core coincide, so we solve through the SVD.
//! (Nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.ncols() == 0 {
        return None;
    }
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve a ridge-penalized least squares problem.
///
/// `penalty[j]` is the (non-negative) weight of `β_j^2`. The penalty is applied
/// by augmenting `X` with `diag(sqrt(penalty))` rows and `y` with zeros.
pub fn solve_ridge(x: &DMatrix<f64>, y: &DVector<f64>, penalty: &[f64]) -> Option<DVector<f64>> {
    let p = x.ncols();
    if penalty.len() != p {
        return None;
    }
    if penalty.iter().all(|&v| v <= 0.0) {
        return solve_least_squares(x, y);
    }

    let n = x.nrows();
    let mut xa = DMatrix::<f64>::zeros(n + p, p);
    xa.view_mut((0, 0), (n, p)).copy_from(x);
    for (j, &pen) in penalty.iter().enumerate() {
        xa[(n + j, j)] = pen.max(0.0).sqrt();
    }
    let mut ya = DVector::<f64>::zeros(n + p);
    ya.rows_mut(0, n).copy_from(y);

    solve_least_squares(&xa, &ya)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn rank_deficient_system_returns_minimum_norm_solution() {
        // Two identical columns: any split of the slope fits, SVD picks the even one.
        let x = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let y = DVector::from_row_slice(&[0.0, 2.0, 4.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-10);
        assert!((beta[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn ridge_shrinks_towards_zero() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[3.0, 3.0, 3.0]);

        // Normal equation: (3 + 3) β = 9  =>  β = 1.5
        let beta = solve_ridge(&x, &y, &[3.0]).unwrap();
        assert!((beta[0] - 1.5).abs() < 1e-10);

        let beta = solve_ridge(&x, &y, &[0.0]).unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-10);
    }
}
