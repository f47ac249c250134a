//! Reporting utilities: residual statistics and pointwise comparisons.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::error::AppError;

/// Residual statistics of predictions against observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualStats {
    pub n: usize,
    pub rmse: f64,
    pub max_abs: f64,
    /// `sum (y - f)^2 / sum y^2` (plain sum when every `y` is zero).
    pub rel_err: f64,
}

/// Compute residual statistics; both slices must have the same length.
pub fn compute_residual_stats(predictions: &[f64], observed: &[f64]) -> Result<ResidualStats, AppError> {
    if predictions.len() != observed.len() {
        return Err(AppError::input(format!(
            "Got {} predictions for {} observations.",
            predictions.len(),
            observed.len()
        )));
    }
    if observed.is_empty() {
        return Err(AppError::data("No observations to compare against."));
    }

    let mut sse = 0.0;
    let mut norm = 0.0;
    let mut max_abs: f64 = 0.0;
    for (f, y) in predictions.iter().zip(observed) {
        let r = y - f;
        if !r.is_finite() {
            return Err(AppError::numeric("Non-finite residual."));
        }
        sse += r * r;
        norm += y * y;
        max_abs = max_abs.max(r.abs());
    }
    let n = observed.len();
    Ok(ResidualStats {
        n,
        rmse: (sse / n as f64).sqrt(),
        max_abs,
        rel_err: if norm > 0.0 { sse / norm } else { sse },
    })
}

/// A model value next to the value it should reproduce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub label: String,
    pub point: Vec<f64>,
    pub expected: f64,
    pub actual: f64,
}

impl Comparison {
    pub fn abs_diff(&self) -> f64 {
        (self.expected - self.actual).abs()
    }
}

/// Largest absolute difference over `comparisons` (0 when empty).
pub fn max_abs_diff(comparisons: &[Comparison]) -> f64 {
    comparisons.iter().map(Comparison::abs_diff).fold(0.0, f64::max)
}
