//! High-level surrogate model handle.
//!
//! `FtModel` is what scripts and the CLI work with: configure every dimension,
//! fit to data, then evaluate or combine. Combination goes through the
//! operator traits on references:
//!
//! ```no_run
//! # use ft_regress::surrogate::{BuildOptions, FtModel};
//! # use ft_regress::domain::Dataset;
//! # fn demo(data: &Dataset) -> Result<(), ft_regress::error::AppError> {
//! let mut a = FtModel::new(2)?;
//! a.set_dim_opts(0, "legendre", -1.0, 1.0, 4)?;
//! a.set_dim_opts(1, "legendre", -1.0, 1.0, 4)?;
//! a.build_data_model(data, &BuildOptions::default())?;
//! let twice = (&a + &a)?;
//! let square = (&a * &a)?;
//! # let _ = (twice, square);
//! # Ok(())
//! # }
//! ```

use std::ops::{Add, Mul};

use tracing::info;

use crate::domain::{Dataset, DimOpts, FitSummary, RegressAlg, RegressObj};
use crate::error::AppError;
use crate::fit::{AdaptOpts, CrossValidate, CvParam, FtRegress, RegressOpts, grid_search};
use crate::math::{BasisKind, LbfgsConfig};
use crate::models::{FunctionTrain, product, round, sum};

/// Settings of `FtModel::build_data_model`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub alg: RegressAlg,
    pub obj: RegressObj,
    pub adapt_rank: bool,
    pub kick_rank: usize,
    pub round_tol: f64,
    pub max_rank: usize,
    pub verbose: usize,
    pub reg_weight: f64,
    pub als_max_sweeps: usize,
    pub als_conv_tol: f64,
    pub kfold: usize,
    pub opt_maxiter: usize,
    pub opt_gtol: f64,
    pub opt_relftol: f64,
    pub opt_absxtol: f64,
    pub seed: u64,
    pub cv_rank: Option<Vec<usize>>,
    pub cv_num_param: Option<Vec<usize>>,
    pub cv_reg_weight: Option<Vec<f64>>,
    pub cv_opt_maxiter: Option<Vec<usize>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            alg: RegressAlg::Aio,
            obj: RegressObj::Ls,
            adapt_rank: false,
            kick_rank: 2,
            round_tol: 1e-5,
            max_rank: 10,
            verbose: 0,
            reg_weight: 1e-10,
            als_max_sweeps: 20,
            als_conv_tol: 1e-5,
            kfold: 5,
            opt_maxiter: 2000,
            opt_gtol: 1e-10,
            opt_relftol: 1e-10,
            opt_absxtol: 1e-30,
            seed: 0,
            cv_rank: None,
            cv_num_param: None,
            cv_reg_weight: None,
            cv_opt_maxiter: None,
        }
    }
}

impl BuildOptions {
    fn regress_opts(&self) -> RegressOpts {
        RegressOpts {
            alg: self.alg,
            obj: self.obj,
            reg_weight: self.reg_weight,
            max_als_sweeps: self.als_max_sweeps,
            als_conv_tol: self.als_conv_tol,
            verbose: self.verbose,
            optimizer: LbfgsConfig {
                max_iter: self.opt_maxiter,
                gtol: self.opt_gtol,
                relftol: self.opt_relftol,
                absxtol: self.opt_absxtol,
                ..LbfgsConfig::default()
            },
            seed: self.seed,
            ..RegressOpts::default()
        }
    }

    fn adapt_opts(&self) -> AdaptOpts {
        AdaptOpts {
            enabled: self.adapt_rank,
            kick_rank: self.kick_rank,
            round_tol: self.round_tol,
            max_rank: self.max_rank,
            kfold: self.kfold,
            ..AdaptOpts::default()
        }
    }

    fn cv_grid(&self) -> Vec<CvParam> {
        let mut grid = Vec::new();
        if let Some(v) = &self.cv_rank {
            grid.push(CvParam::Rank(v.clone()));
        }
        if let Some(v) = &self.cv_num_param {
            grid.push(CvParam::NumParam(v.clone()));
        }
        if let Some(v) = &self.cv_opt_maxiter {
            grid.push(CvParam::OptMaxIter(v.clone()));
        }
        if let Some(v) = &self.cv_reg_weight {
            grid.push(CvParam::RegWeight(v.clone()));
        }
        grid
    }
}

/// A function-train surrogate of a `dim`-variate function.
#[derive(Debug, Clone, PartialEq)]
pub struct FtModel {
    dims: Vec<Option<DimOpts>>,
    ranks: Vec<usize>,
    ft: Option<FunctionTrain>,
    summary: Option<FitSummary>,
}

impl FtModel {
    /// New unbuilt model; interior ranks start at 1.
    pub fn new(dim: usize) -> Result<Self, AppError> {
        if dim == 0 {
            return Err(AppError::input("Model dimension must be >= 1."));
        }
        Ok(Self {
            dims: vec![None; dim],
            ranks: vec![1; dim + 1],
            ft: None,
            summary: None,
        })
    }

    /// Wrap an existing function train (e.g. loaded from a model file).
    pub fn from_ft(ft: FunctionTrain, summary: Option<FitSummary>) -> Self {
        Self {
            dims: ft.dims().iter().copied().map(Some).collect(),
            ranks: ft.ranks(),
            ft: Some(ft),
            summary,
        }
    }

    pub fn dim(&self) -> usize {
        self.dims.len()
    }

    /// Configure dimension `i`: basis family name, bounds and number of basis
    /// functions. Hermite dimensions ignore the bounds.
    pub fn set_dim_opts(&mut self, i: usize, family: &str, lb: f64, ub: f64, nparam: usize) -> Result<(), AppError> {
        if i >= self.dim() {
            return Err(AppError::input(format!(
                "Dimension index {i} out of range for a {}-dimensional model.",
                self.dim()
            )));
        }
        let kind: BasisKind = family.parse()?;
        self.dims[i] = Some(DimOpts::new(kind, lb, ub, nparam)?);
        Ok(())
    }

    /// Starting ranks (`d + 1` entries, first and last 1).
    pub fn set_ranks(&mut self, ranks: &[usize]) -> Result<(), AppError> {
        let d = self.dim();
        if ranks.len() != d + 1 {
            return Err(AppError::input(format!(
                "Expected {} ranks for a {d}-dimensional model, got {}.",
                d + 1,
                ranks.len()
            )));
        }
        if ranks[0] != 1 || ranks[d] != 1 || ranks.contains(&0) {
            return Err(AppError::input(format!(
                "Ranks must be >= 1 with unit boundary ranks (got {ranks:?})."
            )));
        }
        self.ranks = ranks.to_vec();
        Ok(())
    }

    pub fn dim_opts(&self) -> Result<Vec<DimOpts>, AppError> {
        self.dims
            .iter()
            .enumerate()
            .map(|(i, d)| d.ok_or_else(|| AppError::input(format!("Options for dimension {i} are not set."))))
            .collect()
    }

    /// Fit the model to `data`, replacing any previous fit.
    pub fn build_data_model(&mut self, data: &Dataset, opts: &BuildOptions) -> Result<FitSummary, AppError> {
        if data.dim() != self.dim() {
            return Err(AppError::input(format!(
                "Data has dimension {}, model has dimension {}.",
                data.dim(),
                self.dim()
            )));
        }
        let dims = self.dim_opts()?;
        let mut reg = FtRegress::new(dims, &self.ranks, opts.regress_opts())?;
        reg.set_adapt(opts.adapt_opts())?;

        let grid = opts.cv_grid();
        if !grid.is_empty() {
            let cv = CrossValidate::new(data, opts.kfold)?;
            let result = grid_search(&cv, &mut reg, &grid)?;
            if opts.verbose > 0 {
                info!(best = %result.best.describe(), cv_error = result.best_error, "selected settings");
            }
        }

        reg.run(data)?;
        let summary = reg.summary(data)?;
        self.ranks = reg.ranks();
        self.dims = reg.dims().iter().copied().map(Some).collect();
        self.ft = Some(reg.ft().clone());
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn is_built(&self) -> bool {
        self.ft.is_some()
    }

    pub fn ft(&self) -> Result<&FunctionTrain, AppError> {
        self.ft
            .as_ref()
            .ok_or_else(|| AppError::input("Model has not been built yet."))
    }

    pub fn summary(&self) -> Option<&FitSummary> {
        self.summary.as_ref()
    }

    pub fn ranks(&self) -> Vec<usize> {
        match &self.ft {
            Some(ft) => ft.ranks(),
            None => self.ranks.clone(),
        }
    }

    pub fn eval(&self, x: &[f64]) -> Result<f64, AppError> {
        self.ft()?.eval(x)
    }

    /// Evaluate row-major points.
    pub fn eval_batch(&self, x: &[f64]) -> Result<Vec<f64>, AppError> {
        self.ft()?.eval_batch(x)
    }

    pub fn integrate(&self) -> Result<f64, AppError> {
        Ok(self.ft()?.integrate())
    }

    /// L2 norm.
    pub fn norm(&self) -> Result<f64, AppError> {
        Ok(self.ft()?.norm2().sqrt())
    }

    /// Rank-reduced copy within relative L2 tolerance `tol`.
    pub fn round(&self, tol: f64) -> Result<FtModel, AppError> {
        Ok(FtModel::from_ft(round(self.ft()?, tol)?, None))
    }
}

impl Add for &FtModel {
    type Output = Result<FtModel, AppError>;

    fn add(self, rhs: &FtModel) -> Self::Output {
        Ok(FtModel::from_ft(sum(self.ft()?, rhs.ft()?)?, None))
    }
}

impl Mul for &FtModel {
    type Output = Result<FtModel, AppError>;

    fn mul(self, rhs: &FtModel) -> Self::Output {
        Ok(FtModel::from_ft(product(self.ft()?, rhs.ft()?)?, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dataset(d: usize, n: usize, f: impl Fn(&[f64]) -> f64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(5);
        let x: Vec<f64> = (0..n * d).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y = x.chunks(d).map(|r| f(r)).collect();
        Dataset::new(d, x, y).unwrap()
    }

    fn configured(d: usize, nparam: usize) -> FtModel {
        let mut m = FtModel::new(d).unwrap();
        for i in 0..d {
            m.set_dim_opts(i, "legendre", -1.0, 1.0, nparam).unwrap();
        }
        m
    }

    #[test]
    fn unbuilt_model_refuses_evaluation() {
        let m = configured(2, 3);
        assert!(!m.is_built());
        assert_eq!(m.eval(&[0.0, 0.0]).unwrap_err().exit_code(), 2);
        assert!((&m + &m).is_err());
    }

    #[test]
    fn build_requires_every_dimension() {
        let mut m = FtModel::new(2).unwrap();
        m.set_dim_opts(0, "legendre", -1.0, 1.0, 3).unwrap();
        let data = dataset(2, 20, |x| x[0]);
        let err = m.build_data_model(&data, &BuildOptions::default()).unwrap_err();
        assert!(err.message().contains("dimension 1"));
    }

    #[test]
    fn option_setters_validate_input() {
        let mut m = FtModel::new(2).unwrap();
        assert!(m.set_dim_opts(2, "legendre", -1.0, 1.0, 3).is_err());
        assert!(m.set_dim_opts(0, "chebyshev", -1.0, 1.0, 3).is_err());
        assert!(m.set_dim_opts(0, "legendre", 1.0, -1.0, 3).is_err());
        assert!(m.set_dim_opts(0, "Hermite", 0.0, 0.0, 3).is_ok());
        assert!(m.set_ranks(&[1, 2]).is_err());
        assert!(m.set_ranks(&[2, 2, 1]).is_err());
        assert!(m.set_ranks(&[1, 3, 1]).is_ok());
        assert!(FtModel::new(0).is_err());
    }

    #[test]
    fn fitted_models_combine_pointwise() {
        let data_a = dataset(2, 60, |x| x[0] + x[1]);
        let data_b = dataset(2, 60, |x| x[0] * x[0] + x[1] * x[1]);
        let opts = BuildOptions::default();

        let mut a = configured(2, 3);
        a.set_ranks(&[1, 2, 1]).unwrap();
        a.build_data_model(&data_a, &opts).unwrap();
        let mut b = configured(2, 3);
        b.set_ranks(&[1, 2, 1]).unwrap();
        let summary = b.build_data_model(&data_b, &opts).unwrap();
        assert!(summary.train_rel_err < 1e-8);

        let s = (&a + &b).unwrap();
        let p = (&a * &b).unwrap();
        assert_eq!(s.ranks(), vec![1, 4, 1]);
        assert_eq!(p.ranks(), vec![1, 4, 1]);
        for x in [[0.3, -0.6], [-0.9, 0.1]] {
            let (fa, fb) = (a.eval(&x).unwrap(), b.eval(&x).unwrap());
            assert!((s.eval(&x).unwrap() - (fa + fb)).abs() < 1e-10);
            assert!((p.eval(&x).unwrap() - fa * fb).abs() < 1e-10);
        }
    }

    #[test]
    fn grid_options_select_num_param() {
        let data = dataset(2, 80, |x| x[0] * x[0] * x[0] - x[1]);
        let mut m = configured(2, 2);
        m.set_ranks(&[1, 2, 1]).unwrap();
        let opts = BuildOptions {
            cv_num_param: Some(vec![2, 4]),
            kfold: 4,
            ..BuildOptions::default()
        };
        let summary = m.build_data_model(&data, &opts).unwrap();
        assert_eq!(m.dim_opts().unwrap()[0].nparam, 4);
        assert!(summary.cv_error.is_some());
        assert!((m.eval(&[0.5, 0.5]).unwrap() - (0.125 - 0.5)).abs() < 1e-4);
    }

    #[test]
    fn round_reduces_a_redundant_sum() {
        let data = dataset(2, 50, |x| 1.0 + x[0] * x[1]);
        let mut m = configured(2, 3);
        m.set_ranks(&[1, 2, 1]).unwrap();
        m.build_data_model(&data, &BuildOptions::default()).unwrap();
        let doubled = (&m + &m).unwrap();
        let rounded = doubled.round(1e-10).unwrap();
        assert!(rounded.ranks()[1] <= 2);
        let x = [0.4, -0.2];
        assert!((rounded.eval(&x).unwrap() - 2.0 * m.eval(&x).unwrap()).abs() < 1e-8);
        assert!(m.norm().unwrap() > 0.0);
    }
}
