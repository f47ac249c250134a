//! Synthetic regression data.
//!
//! Inputs are drawn from a seeded RNG (uniform on `[lb, ub]` or standard
//! normal) and labelled with one of a few closed-form targets. Used by
//! `ftr demo` and by tests.

use clap::ValueEnum;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::domain::Dataset;
use crate::error::AppError;

/// Closed-form target functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TargetFn {
    /// `sum_i x_i`
    Sum,
    /// `sum_i x_i^2`
    SumSquares,
    /// `log10((sum_i x_i)^2)`
    LogSumSquared,
    /// `prod_i (1 + x_i / 2)`
    Product,
}

impl TargetFn {
    pub fn eval(self, x: &[f64]) -> f64 {
        match self {
            TargetFn::Sum => x.iter().sum(),
            TargetFn::SumSquares => x.iter().map(|v| v * v).sum(),
            TargetFn::LogSumSquared => {
                let s: f64 = x.iter().sum();
                (s * s).log10()
            }
            TargetFn::Product => x.iter().map(|v| 1.0 + 0.5 * v).product(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetFn::Sum => "sum",
            TargetFn::SumSquares => "sum-squares",
            TargetFn::LogSumSquared => "log-sum-squared",
            TargetFn::Product => "product",
        }
    }
}

/// Input distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampling {
    Uniform { lb: f64, ub: f64 },
    StandardNormal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub dim: usize,
    pub n: usize,
    pub sampling: Sampling,
    /// Standard deviation of additive Gaussian label noise.
    pub noise: f64,
    pub seed: u64,
}

/// Draw `n * dim` inputs (row-major).
pub fn sample_inputs(config: &SyntheticConfig) -> Result<Vec<f64>, AppError> {
    if config.dim == 0 || config.n == 0 {
        return Err(AppError::input("Synthetic data needs dim >= 1 and n >= 1."));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    sample_with(&mut rng, config.sampling, config.n * config.dim)
}

/// Inputs plus labels `target(x) + noise`. Rows whose label is not finite
/// (e.g. `log10(0)`) are redrawn.
pub fn generate(config: &SyntheticConfig, target: TargetFn) -> Result<Dataset, AppError> {
    if config.dim == 0 || config.n == 0 {
        return Err(AppError::input("Synthetic data needs dim >= 1 and n >= 1."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::input(format!("Noise level must be >= 0 (got {}).", config.noise)));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, config.noise.max(f64::MIN_POSITIVE))
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;

    let mut x = Vec::with_capacity(config.n * config.dim);
    let mut y = Vec::with_capacity(config.n);
    let mut attempts = 0usize;
    while y.len() < config.n {
        attempts += 1;
        if attempts > 100 * config.n {
            return Err(AppError::data(format!(
                "Target '{}' is not finite on the sampled inputs.",
                target.name()
            )));
        }
        let row = sample_with(&mut rng, config.sampling, config.dim)?;
        let mut v = target.eval(&row);
        if config.noise > 0.0 {
            v += noise.sample(&mut rng);
        }
        if !v.is_finite() {
            continue;
        }
        x.extend(row);
        y.push(v);
    }

    Dataset::new(config.dim, x, y)
}

fn sample_with(rng: &mut StdRng, sampling: Sampling, count: usize) -> Result<Vec<f64>, AppError> {
    match sampling {
        Sampling::Uniform { lb, ub } => {
            if !(lb.is_finite() && ub.is_finite() && lb < ub) {
                return Err(AppError::input(format!("Invalid sampling range [{lb}, {ub}].")));
            }
            let dist = Uniform::new(lb, ub);
            Ok((0..count).map(|_| dist.sample(rng)).collect())
        }
        Sampling::StandardNormal => {
            let dist = Normal::new(0.0, 1.0)
                .map_err(|e| AppError::numeric(format!("Sampling distribution error: {e}")))?;
            Ok((0..count).map(|_| dist.sample(rng)).collect())
        }
    }
}
