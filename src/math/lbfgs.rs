//! Limited-memory BFGS minimizer.
//!
//! All-at-once regression minimizes a smooth, non-convex least squares
//! objective over every coefficient of a function train. The parameter count
//! grows with `d * r^2 * n`, so we keep only the last `memory` curvature pairs
//! and apply the inverse Hessian approximation with the two-loop recursion.
//!
//! Steps are chosen by backtracking until the Armijo sufficient-decrease
//! condition holds. Trial points with non-finite objective values are treated
//! as rejected steps.

use std::collections::VecDeque;

use crate::error::AppError;

/// Sufficient-decrease constant for the Armijo condition.
const ARMIJO_C1: f64 = 1e-4;

/// Maximum number of step halvings per line search.
const MAX_BACKTRACKS: usize = 50;

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsConfig {
    /// Number of stored curvature pairs.
    pub memory: usize,
    pub max_iter: usize,
    /// Stop when `||∇f|| < gtol`.
    pub gtol: f64,
    /// Stop when `|f_k - f_{k+1}| / max(|f_k|, 1e-300) < relftol`.
    pub relftol: f64,
    /// Stop when `||x_{k+1} - x_k|| < absxtol`.
    pub absxtol: f64,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iter: 2000,
            gtol: 1e-10,
            relftol: 1e-10,
            absxtol: 1e-30,
        }
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbfgsStatus {
    GradientTolerance,
    RelativeFunctionTolerance,
    StepTolerance,
    MaxIterations,
    /// No step along the search direction decreased the objective.
    LineSearchFailed,
}

impl LbfgsStatus {
    pub fn converged(self) -> bool {
        matches!(
            self,
            LbfgsStatus::GradientTolerance
                | LbfgsStatus::RelativeFunctionTolerance
                | LbfgsStatus::StepTolerance
        )
    }
}

#[derive(Debug, Clone)]
pub struct LbfgsReport {
    pub value: f64,
    pub iterations: usize,
    pub n_evals: usize,
    pub status: LbfgsStatus,
}

struct CurvaturePair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Minimize `f` starting from `x` (updated in place).
///
/// `f(x, grad)` must return the objective value and write the gradient into
/// `grad`.
pub fn minimize<F>(mut f: F, x: &mut [f64], config: &LbfgsConfig) -> Result<LbfgsReport, AppError>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x.len();
    let mut grad = vec![0.0; n];
    let mut fx = f(x, &mut grad);
    let mut n_evals = 1usize;
    if !fx.is_finite() || grad.iter().any(|g| !g.is_finite()) {
        return Err(AppError::numeric(
            "Objective is not finite at the initial guess.",
        ));
    }
    if n == 0 {
        return Ok(LbfgsReport {
            value: fx,
            iterations: 0,
            n_evals,
            status: LbfgsStatus::GradientTolerance,
        });
    }

    let memory = config.memory.max(1);
    let mut history: VecDeque<CurvaturePair> = VecDeque::with_capacity(memory);
    let mut x_trial = vec![0.0; n];
    let mut g_trial = vec![0.0; n];
    let mut status = LbfgsStatus::MaxIterations;
    let mut iterations = 0usize;

    for iter in 0..config.max_iter {
        iterations = iter;
        if norm(&grad) < config.gtol {
            status = LbfgsStatus::GradientTolerance;
            break;
        }

        let mut direction = two_loop(&grad, &history);
        let mut slope = dot(&grad, &direction);
        if !(slope < 0.0) {
            // Curvature information went stale; restart from steepest descent.
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            slope = dot(&grad, &direction);
        }

        let mut step = if history.is_empty() {
            (1.0 / norm(&grad)).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            for i in 0..n {
                x_trial[i] = x[i] + step * direction[i];
            }
            let f_trial = f(&x_trial, &mut g_trial);
            n_evals += 1;
            if f_trial.is_finite()
                && g_trial.iter().all(|g| g.is_finite())
                && f_trial <= fx + ARMIJO_C1 * step * slope
            {
                accepted = Some(f_trial);
                break;
            }
            step *= 0.5;
        }

        let Some(f_new) = accepted else {
            status = LbfgsStatus::LineSearchFailed;
            break;
        };

        let s: Vec<f64> = (0..n).map(|i| x_trial[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| g_trial[i] - grad[i]).collect();
        let sy = dot(&s, &y);
        let s_norm = norm(&s);

        x.copy_from_slice(&x_trial);
        grad.copy_from_slice(&g_trial);
        let f_old = fx;
        fx = f_new;
        iterations = iter + 1;

        if sy > 1e-12 * s_norm * norm(&y) && sy > 0.0 {
            if history.len() == memory {
                history.pop_front();
            }
            history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
        }

        if (f_old - f_new).abs() / f_old.abs().max(1e-300) < config.relftol {
            status = LbfgsStatus::RelativeFunctionTolerance;
            break;
        }
        if s_norm < config.absxtol {
            status = LbfgsStatus::StepTolerance;
            break;
        }
    }

    Ok(LbfgsReport {
        value: fx,
        iterations,
        n_evals,
        status,
    })
}

/// Compute `-H ∇f` with the L-BFGS two-loop recursion.
fn two_loop(grad: &[f64], history: &VecDeque<CurvaturePair>) -> Vec<f64> {
    let mut q: Vec<f64> = grad.to_vec();
    let mut alphas = vec![0.0; history.len()];

    for (idx, pair) in history.iter().enumerate().rev() {
        let a = pair.rho * dot(&pair.s, &q);
        alphas[idx] = a;
        axpy(-a, &pair.y, &mut q);
    }

    if let Some(last) = history.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        if gamma.is_finite() && gamma > 0.0 {
            q.iter_mut().for_each(|v| *v *= gamma);
        }
    }

    for (idx, pair) in history.iter().enumerate() {
        let b = pair.rho * dot(&pair.y, &q);
        axpy(alphas[idx] - b, &pair.s, &mut q);
    }

    q.iter_mut().for_each(|v| *v = -*v);
    q
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64], g: &mut [f64]) -> f64 {
        let (a, b) = (x[0], x[1]);
        g[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
        g[1] = 200.0 * (b - a * a);
        (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
    }

    #[test]
    fn minimizes_rosenbrock() {
        let mut x = [-1.2, 1.0];
        let config = LbfgsConfig {
            relftol: 1e-16,
            ..LbfgsConfig::default()
        };
        let report = minimize(rosenbrock, &mut x, &config).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-4, "x = {x:?}, report = {report:?}");
        assert!((x[1] - 1.0).abs() < 1e-4, "x = {x:?}, report = {report:?}");
        assert!(report.value < 1e-8);
    }

    #[test]
    fn minimizes_separable_quadratic() {
        let centers = [1.0, -2.0, 3.0, 0.5];
        let mut x = [0.0; 4];
        let report = minimize(
            |x: &[f64], g: &mut [f64]| {
                let mut v = 0.0;
                for i in 0..4 {
                    let scale = (i + 1) as f64;
                    let d = x[i] - centers[i];
                    v += 0.5 * scale * d * d;
                    g[i] = scale * d;
                }
                v
            },
            &mut x,
            &LbfgsConfig::default(),
        )
        .unwrap();
        assert!(report.status.converged());
        for (xi, ci) in x.iter().zip(centers) {
            assert!((xi - ci).abs() < 1e-6);
        }
    }

    #[test]
    fn non_finite_start_is_an_error() {
        let mut x = [0.0];
        let err = minimize(|_: &[f64], _: &mut [f64]| f64::NAN, &mut x, &LbfgsConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
