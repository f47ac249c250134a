//! Regression objectives and their gradients.
//!
//! For data `(x_i, y_i)`, `i = 1..N`, the least-squares objective is
//!
//! ```text
//! J(c) = (1 / N) sum_i 0.5 (y_i - f(x_i; c))^2
//! ```
//!
//! and the sparse-L2 variant adds `0.5 * λ * sum ||f_{k,αβ}||^2` over every
//! univariate function of every core.
//!
//! `f` is multilinear in the cores, so the derivative with respect to
//! coefficient `l` of function `(α, β)` in core `k` is
//! `L_k[α] φ_l(x_k) R_{k+1}[β]`, where `L_k` and `R_{k+1}` are the partial
//! products of the cores to the left and right. Basis values are tabulated
//! once per fit since the data do not change.

use rayon::prelude::*;

use crate::domain::{Dataset, RegressObj};
use crate::error::AppError;
use crate::models::FunctionTrain;

/// Basis values of every sample in every dimension.
#[derive(Debug, Clone)]
pub struct BasisTable {
    /// `phi[k][i * nparam_k + l]`
    phi: Vec<Vec<f64>>,
    nparam: Vec<usize>,
}

impl BasisTable {
    pub fn new(ft: &FunctionTrain, data: &Dataset) -> Self {
        let nparam: Vec<usize> = ft.cores().iter().map(|c| c.nparam).collect();
        let phi = ft
            .dims()
            .par_iter()
            .enumerate()
            .map(|(k, dim)| {
                let n = nparam[k];
                let mut out = vec![0.0; data.len() * n];
                for (i, chunk) in out.chunks_mut(n).enumerate() {
                    dim.eval_basis(data.row(i)[k], chunk);
                }
                out
            })
            .collect();
        Self { phi, nparam }
    }

    pub fn values(&self, k: usize, i: usize) -> &[f64] {
        let n = self.nparam[k];
        &self.phi[k][i * n..(i + 1) * n]
    }
}

/// Per-sample partial products.
///
/// `left[k]` has length `r_k` and holds `G_1 ... G_k` (so `left[0] = [1]`);
/// `right[k]` has length `r_k` and holds `G_{k+1} ... G_d`.
pub(crate) struct SweepWork {
    vals: Vec<Vec<f64>>,
    pub left: Vec<Vec<f64>>,
    pub right: Vec<Vec<f64>>,
}

impl SweepWork {
    pub fn new(ft: &FunctionTrain) -> Self {
        let ranks = ft.ranks();
        Self {
            vals: ft.cores().iter().map(|c| vec![0.0; c.nfuncs()]).collect(),
            left: ranks.iter().map(|&r| vec![0.0; r]).collect(),
            right: ranks.iter().map(|&r| vec![0.0; r]).collect(),
        }
    }

    /// Fill the partial products for sample `i` and return `f(x_i)`.
    pub fn compute(&mut self, ft: &FunctionTrain, table: &BasisTable, i: usize) -> f64 {
        let f = self.forward(ft, table, i);
        self.backward(ft);
        f
    }

    /// Left products only; enough for `f(x_i)`.
    pub fn forward(&mut self, ft: &FunctionTrain, table: &BasisTable, i: usize) -> f64 {
        let d = ft.dim();
        for (k, core) in ft.cores().iter().enumerate() {
            core.eval_with_basis(table.values(k, i), &mut self.vals[k]);
        }

        self.left[0][0] = 1.0;
        for (k, core) in ft.cores().iter().enumerate() {
            let (rl, rr) = (core.r_left, core.r_right);
            let (head, tail) = self.left.split_at_mut(k + 1);
            let prev = &head[k];
            let next = &mut tail[0];
            for col in 0..rr {
                let mut acc = 0.0;
                for row in 0..rl {
                    acc += prev[row] * self.vals[k][col * rl + row];
                }
                next[col] = acc;
            }
        }
        self.left[d][0]
    }

    fn backward(&mut self, ft: &FunctionTrain) {
        let d = ft.dim();
        self.right[d][0] = 1.0;
        for k in (0..d).rev() {
            let core = ft.core(k);
            let (rl, rr) = (core.r_left, core.r_right);
            let (head, tail) = self.right.split_at_mut(k + 1);
            let cur = &mut head[k];
            let after = &tail[0];
            for row in 0..rl {
                let mut acc = 0.0;
                for col in 0..rr {
                    acc += self.vals[k][col * rl + row] * after[col];
                }
                cur[row] = acc;
            }
        }
    }
}

/// Objective bound to one dataset and one train shape.
pub struct Objective<'a> {
    data: &'a Dataset,
    table: BasisTable,
    obj: RegressObj,
    reg_weight: f64,
    /// Physical squared norms `ν_l` per core, used by the sparse penalty.
    sq_norms: Vec<Vec<f64>>,
}

impl<'a> Objective<'a> {
    pub fn new(
        ft: &FunctionTrain,
        data: &'a Dataset,
        obj: RegressObj,
        reg_weight: f64,
    ) -> Result<Self, AppError> {
        if data.dim() != ft.dim() {
            return Err(AppError::input(format!(
                "Data has dimension {}, model has dimension {}.",
                data.dim(),
                ft.dim()
            )));
        }
        let sq_norms = ft
            .cores()
            .iter()
            .zip(ft.dims())
            .map(|(c, dim)| (0..c.nparam).map(|l| dim.sq_norm(l)).collect())
            .collect();
        Ok(Self {
            data,
            table: BasisTable::new(ft, data),
            obj,
            reg_weight,
            sq_norms,
        })
    }

    pub(crate) fn table(&self) -> &BasisTable {
        &self.table
    }

    pub fn data(&self) -> &Dataset {
        self.data
    }

    /// Objective value and gradient at the parameters currently held by `ft`.
    ///
    /// `grad` has one entry per parameter; entries where `free` is false are
    /// zeroed.
    pub fn value_and_grad(&self, ft: &FunctionTrain, free: &[bool], grad: &mut [f64]) -> f64 {
        let n = self.data.len();
        let np = ft.nparams();
        let offsets: Vec<usize> = (0..ft.dim()).map(|k| ft.core_offset(k)).collect();

        let (sse, g) = (0..n)
            .into_par_iter()
            .fold(
                || (0.0, vec![0.0; np], SweepWork::new(ft)),
                |(mut sse, mut g, mut work), i| {
                    let f = work.compute(ft, &self.table, i);
                    let resid = f - self.data.y()[i];
                    sse += resid * resid;
                    for (k, core) in ft.cores().iter().enumerate() {
                        let phi = self.table.values(k, i);
                        let (rl, nparam) = (core.r_left, core.nparam);
                        for col in 0..core.r_right {
                            let r = work.right[k + 1][col];
                            if r == 0.0 {
                                continue;
                            }
                            for row in 0..rl {
                                let w = resid * work.left[k][row] * r;
                                let o = offsets[k] + (col * rl + row) * nparam;
                                for l in 0..nparam {
                                    g[o + l] += w * phi[l];
                                }
                            }
                        }
                    }
                    (sse, g, work)
                },
            )
            .map(|(sse, g, _)| (sse, g))
            .reduce(
                || (0.0, vec![0.0; np]),
                |(s1, mut g1), (s2, g2)| {
                    for (a, b) in g1.iter_mut().zip(&g2) {
                        *a += b;
                    }
                    (s1 + s2, g1)
                },
            );

        let inv_n = 1.0 / n as f64;
        let mut value = 0.5 * sse * inv_n;
        for (gi, gv) in grad.iter_mut().zip(&g) {
            *gi = gv * inv_n;
        }

        if self.penalized() {
            value += self.penalty(ft);
            for (k, core) in ft.cores().iter().enumerate() {
                let nparam = core.nparam;
                for (j, c) in core.coeffs.iter().enumerate() {
                    grad[offsets[k] + j] += self.reg_weight * self.sq_norms[k][j % nparam] * c;
                }
            }
        }

        for (gi, &f) in grad.iter_mut().zip(free) {
            if !f {
                *gi = 0.0;
            }
        }
        value
    }

    /// Objective value only (forward sweeps, no gradient).
    pub fn value(&self, ft: &FunctionTrain) -> f64 {
        let n = self.data.len();
        let sse: f64 = (0..n)
            .into_par_iter()
            .map_init(
                || SweepWork::new(ft),
                |work, i| {
                    let resid = work.forward(ft, &self.table, i) - self.data.y()[i];
                    resid * resid
                },
            )
            .sum();
        let mut value = 0.5 * sse / n as f64;
        if self.penalized() {
            value += self.penalty(ft);
        }
        value
    }

    fn penalized(&self) -> bool {
        self.obj == RegressObj::LsSparseL2 && self.reg_weight > 0.0
    }

    /// `0.5 * λ * sum ν_l c^2` over every coefficient.
    fn penalty(&self, ft: &FunctionTrain) -> f64 {
        let mut acc = 0.0;
        for (k, core) in ft.cores().iter().enumerate() {
            let nparam = core.nparam;
            for (j, c) in core.coeffs.iter().enumerate() {
                acc += self.sq_norms[k][j % nparam] * c * c;
            }
        }
        0.5 * self.reg_weight * acc
    }

    /// Squared norms `ν_l` of the basis functions of core `k`.
    pub fn sq_norms(&self, k: usize) -> &[f64] {
        &self.sq_norms[k]
    }

    pub fn obj(&self) -> RegressObj {
        self.obj
    }

    pub fn reg_weight(&self) -> f64 {
        self.reg_weight
    }
}

/// Training error statistics: `(rmse, sum (y - f)^2 / sum y^2)`.
pub fn training_error(ft: &FunctionTrain, data: &Dataset) -> Result<(f64, f64), AppError> {
    let preds = ft.eval_batch(data.x())?;
    let mut sse = 0.0;
    let mut norm = 0.0;
    for (p, y) in preds.iter().zip(data.y()) {
        sse += (y - p) * (y - p);
        norm += y * y;
    }
    if !sse.is_finite() {
        return Err(AppError::numeric("Non-finite model predictions on training data."));
    }
    let rmse = (sse / data.len() as f64).sqrt();
    let rel = if norm > 0.0 { sse / norm } else { sse };
    Ok((rmse, rel))
}
