//! Function trains.
//!
//! A function train represents
//!
//! ```text
//! f(x_1, ..., x_d) = G_1(x_1) G_2(x_2) ... G_d(x_d)
//! ```
//!
//! where `G_k(x_k)` is an `r_{k-1} x r_k` matrix of univariate expansions and
//! `r_0 = r_d = 1`. Evaluation, integration and inner products all reduce to
//! left-to-right sweeps over small matrices, so their cost is linear in `d`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::DimOpts;
use crate::error::AppError;
use crate::models::core::{Core, uni_inner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTrain {
    dims: Vec<DimOpts>,
    cores: Vec<Core>,
}

impl FunctionTrain {
    /// Assemble a train from parts, checking that the cores chain.
    pub fn from_cores(dims: Vec<DimOpts>, cores: Vec<Core>) -> Result<Self, AppError> {
        if dims.is_empty() {
            return Err(AppError::input("A function train needs at least one dimension."));
        }
        if dims.len() != cores.len() {
            return Err(AppError::input(format!(
                "Got {} dimensions but {} cores.",
                dims.len(),
                cores.len()
            )));
        }
        let d = cores.len();
        if cores[0].r_left != 1 || cores[d - 1].r_right != 1 {
            return Err(AppError::input("Outer ranks of a function train must be 1."));
        }
        for (k, core) in cores.iter().enumerate() {
            if core.r_left == 0 || core.r_right == 0 || core.nparam == 0 {
                return Err(AppError::input(format!("Core {k} has an empty shape.")));
            }
            if core.coeffs.len() != core.r_left * core.r_right * core.nparam {
                return Err(AppError::input(format!("Core {k} has the wrong coefficient count.")));
            }
            if k + 1 < d && core.r_right != cores[k + 1].r_left {
                return Err(AppError::input(format!(
                    "Rank mismatch between cores {k} and {}.",
                    k + 1
                )));
            }
        }
        let dims = dims
            .into_iter()
            .zip(&cores)
            .enumerate()
            .map(|(k, (dim, core))| {
                DimOpts::new(dim.kind, dim.lb, dim.ub, core.nparam)
                    .map_err(|e| AppError::input(format!("Dimension {k}: {}", e.message())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { dims, cores })
    }

    /// All-zero train with the given ranks (`ranks.len() == dims.len() + 1`).
    pub fn zeros(dims: &[DimOpts], ranks: &[usize]) -> Result<Self, AppError> {
        validate_ranks(dims.len(), ranks)?;
        let cores = dims
            .iter()
            .enumerate()
            .map(|(k, dim)| Core::zeros(ranks[k], ranks[k + 1], dim.nparam))
            .collect();
        Self::from_cores(dims.to_vec(), cores)
    }

    /// Rank-1 train of the constant function `value`.
    pub fn constant(dims: &[DimOpts], value: f64) -> Result<Self, AppError> {
        let mut ft = Self::zeros(dims, &vec![1; dims.len() + 1])?;
        // The first basis function is identically one in both families.
        for (k, core) in ft.cores.iter_mut().enumerate() {
            core.coeffs[0] = if k == 0 { value } else { 1.0 };
        }
        Ok(ft)
    }

    /// Rank-2 train of `sum_k (slopes[k] x_k + offsets[k])`.
    pub fn linear(dims: &[DimOpts], slopes: &[f64], offsets: &[f64]) -> Result<Self, AppError> {
        let d = dims.len();
        if slopes.len() != d || offsets.len() != d {
            return Err(AppError::input(format!(
                "Linear function train needs {d} slopes and offsets."
            )));
        }
        if d == 1 {
            let mut ft = Self::zeros(dims, &[1, 1])?;
            let c = dims[0].linear_coeffs(slopes[0], offsets[0], dims[0].nparam);
            ft.cores[0].set_func(0, 0, &c);
            return Ok(ft);
        }

        let mut ranks = vec![2; d + 1];
        ranks[0] = 1;
        ranks[d] = 1;
        let mut ft = Self::zeros(dims, &ranks)?;
        let one = [1.0];
        for k in 0..d {
            let g = dims[k].linear_coeffs(slopes[k], offsets[k], dims[k].nparam);
            let core = &mut ft.cores[k];
            if k == 0 {
                core.set_func(0, 0, &g);
                core.set_func(0, 1, &one);
            } else if k == d - 1 {
                core.set_func(0, 0, &one);
                core.set_func(1, 0, &g);
            } else {
                core.set_func(0, 0, &one);
                core.set_func(1, 0, &g);
                core.set_func(1, 1, &one);
            }
        }
        Ok(ft)
    }

    pub fn dim(&self) -> usize {
        self.cores.len()
    }

    pub fn dims(&self) -> &[DimOpts] {
        &self.dims
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn core(&self, k: usize) -> &Core {
        &self.cores[k]
    }

    pub(crate) fn core_mut(&mut self, k: usize) -> &mut Core {
        &mut self.cores[k]
    }

    /// `[r_0, r_1, ..., r_d]`.
    pub fn ranks(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.dim() + 1);
        out.push(1);
        out.extend(self.cores.iter().map(|c| c.r_right));
        out
    }

    pub fn max_rank(&self) -> usize {
        self.ranks().into_iter().max().unwrap_or(1)
    }

    /// Total number of coefficients.
    pub fn nparams(&self) -> usize {
        self.cores.iter().map(|c| c.coeffs.len()).sum()
    }

    /// All coefficients, core by core.
    pub fn params(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.nparams());
        for core in &self.cores {
            out.extend_from_slice(&core.coeffs);
        }
        out
    }

    pub fn set_params(&mut self, params: &[f64]) -> Result<(), AppError> {
        if params.len() != self.nparams() {
            return Err(AppError::input(format!(
                "Expected {} parameters, got {}.",
                self.nparams(),
                params.len()
            )));
        }
        let mut offset = 0;
        for core in &mut self.cores {
            let n = core.coeffs.len();
            core.coeffs.copy_from_slice(&params[offset..offset + n]);
            offset += n;
        }
        Ok(())
    }

    /// Offset of the first coefficient of core `k` in `params()`.
    pub fn core_offset(&self, k: usize) -> usize {
        self.cores[..k].iter().map(|c| c.coeffs.len()).sum()
    }

    pub fn check_point(&self, x: &[f64]) -> Result<(), AppError> {
        if x.len() != self.dim() {
            return Err(AppError::input(format!(
                "Point has {} coordinates, model has dimension {}.",
                x.len(),
                self.dim()
            )));
        }
        Ok(())
    }

    /// Evaluate at one point.
    pub fn eval(&self, x: &[f64]) -> Result<f64, AppError> {
        self.check_point(x)?;
        Ok(self.eval_unchecked(x))
    }

    pub(crate) fn eval_unchecked(&self, x: &[f64]) -> f64 {
        let max_r = self.max_rank();
        let max_n = self.cores.iter().map(|c| c.nparam).max().unwrap_or(1);
        let mut v = vec![0.0; max_r];
        let mut w = vec![0.0; max_r];
        let mut phi = vec![0.0; max_n];
        v[0] = 1.0;
        for (k, core) in self.cores.iter().enumerate() {
            let phi = &mut phi[..core.nparam];
            self.dims[k].eval_basis(x[k], phi);
            core.contract_left(&v[..core.r_left], phi, &mut w[..core.r_right]);
            std::mem::swap(&mut v, &mut w);
        }
        v[0]
    }

    /// Evaluate many points given row-major coordinates.
    pub fn eval_batch(&self, x: &[f64]) -> Result<Vec<f64>, AppError> {
        let d = self.dim();
        if x.len() % d != 0 {
            return Err(AppError::input(format!(
                "Batch of {} values is not a multiple of the dimension {d}.",
                x.len()
            )));
        }
        Ok(x.par_chunks(d).map(|row| self.eval_unchecked(row)).collect())
    }

    /// Integral over the product measure of every dimension.
    pub fn integrate(&self) -> f64 {
        let mut v = vec![1.0];
        for (k, core) in self.cores.iter().enumerate() {
            let m = core.integral_matrix(&self.dims[k]);
            let mut w = vec![0.0; core.r_right];
            for (col, wc) in w.iter_mut().enumerate() {
                for (row, vr) in v.iter().enumerate() {
                    *wc += vr * m[col * core.r_left + row];
                }
            }
            v = w;
        }
        v[0]
    }

    /// L2 inner product with another train over the same domain.
    pub fn inner(&self, other: &FunctionTrain) -> Result<f64, AppError> {
        self.check_compatible(other)?;
        // m[a * rb + b] accumulates the contraction over all previous cores.
        let mut m = vec![1.0];
        for k in 0..self.dim() {
            let ca = &self.cores[k];
            let cb = &other.cores[k];
            let dim = &self.dims[k];
            let (ral, rar, rbl, rbr) = (ca.r_left, ca.r_right, cb.r_left, cb.r_right);
            let mut next = vec![0.0; rar * rbr];
            for beta in 0..rar {
                for beta2 in 0..rbr {
                    let mut acc = 0.0;
                    for alpha in 0..ral {
                        for alpha2 in 0..rbl {
                            let left = m[alpha * rbl + alpha2];
                            if left == 0.0 {
                                continue;
                            }
                            acc += left * uni_inner(dim, ca.func(alpha, beta), cb.func(alpha2, beta2));
                        }
                    }
                    next[beta * rbr + beta2] = acc;
                }
            }
            m = next;
        }
        Ok(m[0])
    }

    /// Squared L2 norm.
    pub fn norm2(&self) -> f64 {
        self.inner(self).map(|v| v.max(0.0)).unwrap_or(0.0)
    }

    /// Squared L2 norm of `self - other`.
    pub fn norm2_diff(&self, other: &FunctionTrain) -> Result<f64, AppError> {
        let diff = crate::models::algebra::difference(self, other)?;
        Ok(diff.norm2())
    }

    /// Multiply by a scalar (applied to the first core).
    pub fn scale(&mut self, a: f64) {
        for c in &mut self.cores[0].coeffs {
            *c *= a;
        }
    }

    pub fn scaled(&self, a: f64) -> Self {
        let mut out = self.clone();
        out.scale(a);
        out
    }

    /// Both trains live on the same domain: same dimension, family and bounds.
    pub fn check_compatible(&self, other: &FunctionTrain) -> Result<(), AppError> {
        if self.dim() != other.dim() {
            return Err(AppError::input(format!(
                "Dimension mismatch: {} vs {}.",
                self.dim(),
                other.dim()
            )));
        }
        for (k, (a, b)) in self.dims.iter().zip(&other.dims).enumerate() {
            if !a.same_domain(b) {
                return Err(AppError::input(format!(
                    "Dimension {k} differs in basis family or bounds."
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_ranks(d: usize, ranks: &[usize]) -> Result<(), AppError> {
    if ranks.len() != d + 1 {
        return Err(AppError::input(format!(
            "Expected {} ranks for dimension {d}, got {}.",
            d + 1,
            ranks.len()
        )));
    }
    if ranks[0] != 1 || ranks[d] != 1 {
        return Err(AppError::input("The first and last ranks must be 1."));
    }
    if ranks.iter().any(|&r| r == 0) {
        return Err(AppError::input("Ranks must be >= 1."));
    }
    Ok(())
}
