//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - written into model JSON files
//! - reloaded later for evaluation, combination or plotting

use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::BasisKind;

/// Per-dimension basis configuration.
///
/// For Legendre dimensions `[lb, ub]` is the interval mapped onto `[-1, 1]`.
/// Hermite dimensions ignore the bounds (stored as zeros so model JSON stays
/// finite).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimOpts {
    pub kind: BasisKind,
    pub lb: f64,
    pub ub: f64,
    /// Number of basis functions (polynomial degree + 1).
    pub nparam: usize,
}

impl DimOpts {
    pub fn new(kind: BasisKind, lb: f64, ub: f64, nparam: usize) -> Result<Self, AppError> {
        match kind {
            BasisKind::Legendre => Self::legendre(lb, ub, nparam),
            BasisKind::Hermite => Self::hermite(nparam),
        }
    }

    pub fn legendre(lb: f64, ub: f64, nparam: usize) -> Result<Self, AppError> {
        if !(lb.is_finite() && ub.is_finite() && lb < ub) {
            return Err(AppError::input(format!(
                "Legendre bounds must be finite with lb < ub (got [{lb}, {ub}])."
            )));
        }
        if nparam == 0 {
            return Err(AppError::input("Number of basis functions must be >= 1."));
        }
        Ok(Self {
            kind: BasisKind::Legendre,
            lb,
            ub,
            nparam,
        })
    }

    pub fn hermite(nparam: usize) -> Result<Self, AppError> {
        if nparam == 0 {
            return Err(AppError::input("Number of basis functions must be >= 1."));
        }
        Ok(Self {
            kind: BasisKind::Hermite,
            lb: 0.0,
            ub: 0.0,
            nparam,
        })
    }

    pub fn with_nparam(self, nparam: usize) -> Self {
        Self { nparam, ..self }
    }

    /// Map a physical coordinate onto the reference domain of the family.
    pub fn to_reference(&self, x: f64) -> f64 {
        match self.kind {
            BasisKind::Legendre => 2.0 * (x - self.lb) / (self.ub - self.lb) - 1.0,
            BasisKind::Hermite => x,
        }
    }

    /// Fill `out[l]` with basis `l` evaluated at physical coordinate `x`.
    pub fn eval_basis(&self, x: f64, out: &mut [f64]) {
        self.kind.eval(self.to_reference(x), out);
    }

    /// Jacobian of the reference map: `dx = jacobian * dt`.
    pub fn jacobian(&self) -> f64 {
        match self.kind {
            BasisKind::Legendre => 0.5 * (self.ub - self.lb),
            BasisKind::Hermite => 1.0,
        }
    }

    /// Squared L2 norm of basis `l` under the dimension's measure (Lebesgue on
    /// `[lb, ub]` or standard normal).
    pub fn sq_norm(&self, l: usize) -> f64 {
        self.kind.ref_sq_norm(l) * self.jacobian()
    }

    /// Integral of basis `l` under the dimension's measure.
    pub fn basis_integral(&self, l: usize) -> f64 {
        if l != 0 {
            return 0.0;
        }
        match self.kind {
            BasisKind::Legendre => self.ub - self.lb,
            BasisKind::Hermite => 1.0,
        }
    }

    /// Coefficients of `a x + b` in the first `n` basis functions.
    pub fn linear_coeffs(&self, a: f64, b: f64, n: usize) -> Vec<f64> {
        let (c0, c1) = match self.kind {
            BasisKind::Legendre => {
                let mid = 0.5 * (self.lb + self.ub);
                let half = 0.5 * (self.ub - self.lb);
                (a * mid + b, a * half)
            }
            BasisKind::Hermite => (b, a),
        };
        let mut out = vec![0.0; n];
        if n > 0 {
            out[0] = c0;
        }
        if n > 1 {
            out[1] = c1;
        }
        out
    }

    /// Two dimensions can be combined when family and bounds agree (the
    /// number of basis functions may differ).
    pub fn same_domain(&self, other: &DimOpts) -> bool {
        self.kind == other.kind && self.lb == other.lb && self.ub == other.ub
    }
}

/// A regression dataset: `n` rows of `dim` features plus one label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    dim: usize,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Dataset {
    /// `x` is row-major with `y.len()` rows of `dim` values.
    pub fn new(dim: usize, x: Vec<f64>, y: Vec<f64>) -> Result<Self, AppError> {
        if dim == 0 {
            return Err(AppError::input("Dataset dimension must be >= 1."));
        }
        if y.is_empty() {
            return Err(AppError::data("Dataset has no rows."));
        }
        if x.len() != dim * y.len() {
            return Err(AppError::input(format!(
                "Feature array has {} values, expected {} rows x {dim} columns.",
                x.len(),
                y.len()
            )));
        }
        if x.iter().chain(&y).any(|v| !v.is_finite()) {
            return Err(AppError::input("Dataset contains non-finite values."));
        }
        Ok(Self { dim, x, y })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.x[i * self.dim..(i + 1) * self.dim]
    }

    /// Split into `(train, test)` where `test` holds rows `start..start + len`.
    ///
    /// Either side may be empty, so the results are raw parts rather than
    /// validated datasets.
    pub fn split_rows(&self, start: usize, len: usize) -> (RawRows, RawRows) {
        let end = (start + len).min(self.len());
        let mut train = RawRows::with_capacity(self.dim, self.len() - (end - start));
        let mut test = RawRows::with_capacity(self.dim, end - start);
        for i in 0..self.len() {
            let target = if (start..end).contains(&i) {
                &mut test
            } else {
                &mut train
            };
            target.x.extend_from_slice(self.row(i));
            target.y.push(self.y[i]);
        }
        (train, test)
    }
}

/// Unvalidated rows extracted from a `Dataset`.
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    pub dim: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl RawRows {
    fn with_capacity(dim: usize, n: usize) -> Self {
        Self {
            dim,
            x: Vec::with_capacity(n * dim),
            y: Vec::with_capacity(n),
        }
    }

    pub fn into_dataset(self) -> Result<Dataset, AppError> {
        Dataset::new(self.dim, self.x, self.y)
    }
}

/// Optimization strategy for the regression problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RegressAlg {
    /// All-at-once: L-BFGS over every parameter.
    Aio,
    /// Alternating least squares, one core at a time.
    Als,
}

impl FromStr for RegressAlg {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AIO" => Ok(RegressAlg::Aio),
            "ALS" => Ok(RegressAlg::Als),
            other => Err(AppError::input(format!(
                "Unknown regression algorithm '{other}' (expected AIO or ALS)."
            ))),
        }
    }
}

/// Regression objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum RegressObj {
    /// Plain least squares.
    #[serde(rename = "ls")]
    #[value(name = "ls")]
    Ls,
    /// Least squares plus an L2 penalty on every univariate function.
    #[serde(rename = "ls-sparse-l2")]
    #[value(name = "ls-sparse-l2")]
    LsSparseL2,
}

impl FromStr for RegressObj {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "LS" => Ok(RegressObj::Ls),
            "LS_SPARSEL2" | "LS_SPARSE_L2" => Ok(RegressObj::LsSparseL2),
            other => Err(AppError::input(format!(
                "Unknown regression objective '{other}' (expected LS or LS_SPARSEL2)."
            ))),
        }
    }
}

/// One iteration of rank adaptation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptStep {
    pub iteration: usize,
    pub rounded_ranks: Vec<usize>,
    pub new_ranks: Vec<usize>,
    pub cv_error: f64,
    pub accepted: bool,
}

/// Outcome of fitting a model to data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub alg: RegressAlg,
    pub obj: RegressObj,
    pub n_train: usize,
    pub ranks: Vec<usize>,
    pub nparams: usize,
    /// Final objective value of the last fixed-rank run.
    pub objective: f64,
    /// Root mean squared training residual.
    pub train_rmse: f64,
    /// `sum (y - f)^2 / sum y^2` on the training data.
    pub train_rel_err: f64,
    /// Cross-validation error of the accepted setting, when one was computed.
    pub cv_error: Option<f64>,
    #[serde(default)]
    pub adapt_history: Vec<AdaptStep>,
}
