//! Parameterized function trains.
//!
//! The regressor optimizes the flat coefficient vector of a `FunctionTrain`.
//! During rank adaptation part of that vector can be frozen: `restrict[k]`
//! (one entry per rank edge, `k = 0..=d`) marks the leading block of every
//! core that was already optimized, and a univariate function `(row, col)` of
//! core `k` is frozen when `row < restrict[k]` and `col < restrict[k + 1]`.
//! An all-zero restriction leaves every parameter free.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::domain::{Dataset, DimOpts};
use crate::error::AppError;
use crate::math::solve_least_squares;
use crate::models::FunctionTrain;

/// Parameters whose squared norm is below this are treated as "unset".
pub const ZERO_PARAM_TOL: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq)]
pub struct FtParam {
    ft: FunctionTrain,
    restrict: Vec<usize>,
}

impl FtParam {
    /// Zero parameters at the given ranks.
    pub fn new(dims: &[DimOpts], ranks: &[usize]) -> Result<Self, AppError> {
        let ft = FunctionTrain::zeros(dims, ranks)?;
        let restrict = vec![0; dims.len() + 1];
        Ok(Self { ft, restrict })
    }

    pub fn from_ft(ft: FunctionTrain) -> Self {
        let restrict = vec![0; ft.dim() + 1];
        Self { ft, restrict }
    }

    pub fn ft(&self) -> &FunctionTrain {
        &self.ft
    }

    pub fn into_ft(self) -> FunctionTrain {
        self.ft
    }

    pub fn dim(&self) -> usize {
        self.ft.dim()
    }

    pub fn dims(&self) -> &[DimOpts] {
        self.ft.dims()
    }

    pub fn ranks(&self) -> Vec<usize> {
        self.ft.ranks()
    }

    pub fn nparams(&self) -> usize {
        self.ft.nparams()
    }

    pub fn params(&self) -> Vec<f64> {
        self.ft.params()
    }

    pub fn set_params(&mut self, params: &[f64]) -> Result<(), AppError> {
        self.ft.set_params(params)
    }

    pub(crate) fn ft_mut(&mut self) -> &mut FunctionTrain {
        &mut self.ft
    }

    /// True when no initialization has happened yet.
    pub fn is_zero(&self) -> bool {
        let norm: f64 = self.ft.cores().iter().flat_map(|c| &c.coeffs).map(|v| v * v).sum();
        norm.abs() <= ZERO_PARAM_TOL
    }

    pub fn restrict(&self) -> &[usize] {
        &self.restrict
    }

    pub fn is_restricted(&self) -> bool {
        self.restrict.iter().any(|&r| r > 0)
    }

    pub fn set_restrict(&mut self, restrict: Vec<usize>) -> Result<(), AppError> {
        if restrict.len() != self.dim() + 1 {
            return Err(AppError::input(format!(
                "Rank restriction needs {} entries, got {}.",
                self.dim() + 1,
                restrict.len()
            )));
        }
        self.restrict = restrict;
        Ok(())
    }

    pub fn clear_restrict(&mut self) {
        self.restrict.iter_mut().for_each(|r| *r = 0);
    }

    /// Is function `(row, col)` of core `k` frozen?
    pub fn is_frozen(&self, k: usize, row: usize, col: usize) -> bool {
        row < self.restrict[k] && col < self.restrict[k + 1]
    }

    /// One flag per parameter: `true` when the optimizer may change it.
    pub fn free_mask(&self) -> Vec<bool> {
        let mut mask = Vec::with_capacity(self.nparams());
        for (k, core) in self.ft.cores().iter().enumerate() {
            for col in 0..core.r_right {
                for row in 0..core.r_left {
                    let free = !self.is_frozen(k, row, col);
                    mask.extend(std::iter::repeat_n(free, core.nparam));
                }
            }
        }
        mask
    }

    pub fn n_free(&self) -> usize {
        self.free_mask().into_iter().filter(|&f| f).count()
    }

    /// Constant function `value` embedded in the top-left entry of each core.
    pub fn init_constant(&mut self, value: f64) -> Result<(), AppError> {
        let constant = FunctionTrain::constant(self.dims(), value)?;
        self.embed(&constant, 0.0);
        Ok(())
    }

    /// Initialize from a linear least-squares fit `y ~ a^T x + c`.
    ///
    /// Every parameter starts at `perturb * U(-1, 1)`. The leading `2 x 2`
    /// block of each core then receives the rank-2 representation of the
    /// linear fit (the intercept split evenly across dimensions). Cores of
    /// shape `1 x 1` cannot hold it and take the constant intercept instead.
    pub fn init_linear_ls(&mut self, data: &Dataset, perturb: f64, seed: u64) -> Result<(), AppError> {
        let d = self.dim();
        if data.dim() != d {
            return Err(AppError::input(format!(
                "Data has dimension {}, model has dimension {d}.",
                data.dim()
            )));
        }
        let n = data.len();
        let a = DMatrix::from_fn(n, d + 1, |i, j| if j < d { data.row(i)[j] } else { 1.0 });
        let b = DVector::from_column_slice(data.y());
        let weights = solve_least_squares(&a, &b)
            .ok_or_else(|| AppError::numeric("Linear least squares initialization failed."))?;

        let slopes: Vec<f64> = weights.iter().take(d).copied().collect();
        let intercept = weights[d];
        let offsets = vec![intercept / d as f64; d];
        debug!(?slopes, intercept, "linear least squares initialization");

        let linear = FunctionTrain::linear(self.dims(), &slopes, &offsets)?;
        let constant = FunctionTrain::constant(self.dims(), intercept)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = Vec::with_capacity(self.nparams());
        for _ in 0..self.nparams() {
            params.push(perturb * rng.gen_range(-1.0..1.0));
        }
        self.ft.set_params(&params)?;

        for k in 0..d {
            let core = self.ft.core(k);
            let minrow = core.r_left.min(2);
            let mincol = core.r_right.min(2);
            let source = if minrow == 1 && mincol == 1 && d > 1 {
                constant.core(k)
            } else {
                linear.core(k)
            };
            let core = self.ft.core_mut(k);
            for col in 0..mincol {
                for row in 0..minrow {
                    let src = source.func(row, col);
                    let dst = core.func_mut(row, col);
                    for (dv, sv) in dst.iter_mut().zip(src) {
                        *dv += sv;
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy `small` into the leading blocks of every core and set every other
    /// coefficient to `fill`. `small` must not exceed the current ranks.
    pub fn embed(&mut self, small: &FunctionTrain, fill: f64) {
        for k in 0..self.dim() {
            let src = small.core(k);
            let dst = self.ft.core_mut(k);
            dst.coeffs.iter_mut().for_each(|c| *c = fill);
            for col in 0..src.r_right.min(dst.r_right) {
                for row in 0..src.r_left.min(dst.r_left) {
                    dst.set_func(row, col, src.func(row, col));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(d: usize, n: usize) -> Vec<DimOpts> {
        (0..d).map(|_| DimOpts::legendre(-1.0, 1.0, n).unwrap()).collect()
    }

    fn linear_data() -> Dataset {
        // y = 1 + 2 x0 - x1 + 0.5 x2 on a small deterministic grid
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let p = [
                (i as f64 * 0.37).sin(),
                (i as f64 * 0.91).cos(),
                ((i * 7 % 11) as f64) / 5.5 - 1.0,
            ];
            x.extend_from_slice(&p);
            y.push(1.0 + 2.0 * p[0] - p[1] + 0.5 * p[2]);
        }
        Dataset::new(3, x, y).unwrap()
    }

    #[test]
    fn linear_init_reproduces_linear_data() {
        let data = linear_data();
        let mut p = FtParam::new(&dims(3, 3), &[1, 3, 2, 1]).unwrap();
        assert!(p.is_zero());
        p.init_linear_ls(&data, 0.0, 7).unwrap();
        assert!(!p.is_zero());
        for i in 0..data.len() {
            let f = p.ft().eval(data.row(i)).unwrap();
            assert!((f - data.y()[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn linear_init_is_deterministic_per_seed() {
        let data = linear_data();
        let mut a = FtParam::new(&dims(3, 3), &[1, 2, 2, 1]).unwrap();
        let mut b = a.clone();
        a.init_linear_ls(&data, 1e-3, 11).unwrap();
        b.init_linear_ls(&data, 1e-3, 11).unwrap();
        assert_eq!(a.params(), b.params());
    }

    #[test]
    fn rank_one_init_uses_the_intercept() {
        let data = linear_data();
        let mut p = FtParam::new(&dims(3, 2), &[1, 1, 1, 1]).unwrap();
        p.init_linear_ls(&data, 0.0, 1).unwrap();
        let f = p.ft().eval(&[0.0, 0.0, 0.0]).unwrap();
        assert!((f - 1.0).abs() < 1e-10);
    }

    #[test]
    fn restriction_freezes_leading_blocks() {
        let mut p = FtParam::new(&dims(3, 2), &[1, 3, 3, 1]).unwrap();
        assert_eq!(p.n_free(), p.nparams());
        p.set_restrict(vec![1, 2, 3, 1]).unwrap();
        // core 0: cols 0..2 frozen; core 1: rows 0..2 x cols 0..3 frozen;
        // core 2: rows 0..3 frozen.
        assert!(p.is_frozen(0, 0, 1));
        assert!(!p.is_frozen(0, 0, 2));
        assert!(p.is_frozen(1, 1, 2));
        assert!(!p.is_frozen(1, 2, 0));
        assert!(p.is_frozen(2, 2, 0));
        assert_eq!(p.n_free(), 2 * (1 + 3));
        p.clear_restrict();
        assert!(!p.is_restricted());
        assert!(p.set_restrict(vec![1, 1]).is_err());
    }

    #[test]
    fn embed_copies_leading_blocks_and_fills_the_rest() {
        let small = FunctionTrain::constant(&dims(2, 2), 3.0).unwrap();
        let mut p = FtParam::new(&dims(2, 2), &[1, 2, 1]).unwrap();
        p.embed(&small, 1e-4);
        assert_eq!(p.ft().core(0).func(0, 0), &[3.0, 0.0]);
        assert_eq!(p.ft().core(0).func(0, 1), &[1e-4, 1e-4]);
        assert_eq!(p.ft().core(1).func(0, 0), &[1.0, 0.0]);
        assert_eq!(p.ft().core(1).func(1, 0), &[1e-4, 1e-4]);
    }
}
