//! Fixed-rank regression runs and the regressor state.
//!
//! `FtRegress` owns the parameterized train and every option of a fit. It is
//! the object that cross-validation clones and rank adaptation resizes, so
//! the fitted parameters double as the warm start of the next `run`.
//!
//! Two algorithms are available:
//!
//! - AIO: L-BFGS over all free parameters at once.
//! - ALS: sweeps over the cores. The model is linear in the coefficients of
//!   a single core, so each core update is an exact (ridge) least squares
//!   solve.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{AdaptStep, Dataset, DimOpts, FitSummary, RegressAlg, RegressObj};
use crate::error::AppError;
use crate::fit::objective::{Objective, SweepWork, training_error};
use crate::fit::param::FtParam;
use crate::math::{LbfgsConfig, minimize, solve_ridge};
use crate::models::FunctionTrain;

/// Options of a fixed-rank run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressOpts {
    pub alg: RegressAlg,
    pub obj: RegressObj,
    /// `λ` of the sparse-L2 objective.
    pub reg_weight: f64,
    pub max_als_sweeps: usize,
    /// ALS stops once `||f - f_prev|| / ||f||` drops below this.
    pub als_conv_tol: f64,
    pub verbose: usize,
    pub optimizer: LbfgsConfig,
    /// Magnitude of the random perturbation of the linear initialization.
    pub perturb: f64,
    pub seed: u64,
}

impl Default for RegressOpts {
    fn default() -> Self {
        Self {
            alg: RegressAlg::Aio,
            obj: RegressObj::Ls,
            reg_weight: 1e-10,
            max_als_sweeps: 10,
            als_conv_tol: 1e-5,
            verbose: 0,
            optimizer: LbfgsConfig::default(),
            perturb: 1e-3,
            seed: 0,
        }
    }
}

/// Options of rank-adaptive fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptOpts {
    pub enabled: bool,
    pub kick_rank: usize,
    pub round_tol: f64,
    pub max_rank: usize,
    pub kfold: usize,
    /// Only optimize the functions added by a kick.
    pub opt_restricted: bool,
    /// Refit every parameter once adaptation ends.
    pub finalize: bool,
}

impl Default for AdaptOpts {
    fn default() -> Self {
        Self {
            enabled: false,
            kick_rank: 1,
            round_tol: 1e-8,
            max_rank: 10,
            kfold: 5,
            opt_restricted: false,
            finalize: true,
        }
    }
}

/// Result of the most recent fixed-rank run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub objective: f64,
    /// L-BFGS iterations (AIO) or sweeps (ALS).
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct FtRegress {
    param: FtParam,
    opts: RegressOpts,
    adapt: AdaptOpts,
    last_run: Option<RunReport>,
    pub(crate) history: Vec<AdaptStep>,
    pub(crate) cv_error: Option<f64>,
}

impl FtRegress {
    pub fn new(dims: Vec<DimOpts>, ranks: &[usize], opts: RegressOpts) -> Result<Self, AppError> {
        Ok(Self {
            param: FtParam::new(&dims, ranks)?,
            opts,
            adapt: AdaptOpts::default(),
            last_run: None,
            history: Vec::new(),
            cv_error: None,
        })
    }

    pub fn dim(&self) -> usize {
        self.param.dim()
    }

    pub fn dims(&self) -> &[DimOpts] {
        self.param.dims()
    }

    pub fn ranks(&self) -> Vec<usize> {
        self.param.ranks()
    }

    pub fn param(&self) -> &FtParam {
        &self.param
    }

    pub fn param_mut(&mut self) -> &mut FtParam {
        &mut self.param
    }

    pub fn ft(&self) -> &FunctionTrain {
        self.param.ft()
    }

    pub fn opts(&self) -> &RegressOpts {
        &self.opts
    }

    pub fn opts_mut(&mut self) -> &mut RegressOpts {
        &mut self.opts
    }

    pub fn adapt_opts(&self) -> &AdaptOpts {
        &self.adapt
    }

    pub fn set_adapt(&mut self, adapt: AdaptOpts) -> Result<(), AppError> {
        if adapt.enabled {
            if adapt.kick_rank == 0 {
                return Err(AppError::input("Kick rank must be >= 1."));
            }
            if adapt.max_rank == 0 {
                return Err(AppError::input("Maximum rank must be >= 1."));
            }
            if !(adapt.round_tol.is_finite() && adapt.round_tol >= 0.0) {
                return Err(AppError::input("Rounding tolerance must be >= 0."));
            }
        }
        self.adapt = adapt;
        Ok(())
    }

    pub(crate) fn set_adapt_enabled(&mut self, enabled: bool) {
        self.adapt.enabled = enabled;
    }

    pub fn last_run(&self) -> Option<&RunReport> {
        self.last_run.as_ref()
    }

    /// Change the ranks. Parameters restart from zero.
    pub fn reset_ranks(&mut self, ranks: &[usize]) -> Result<(), AppError> {
        self.param = FtParam::new(&self.dims().to_vec(), ranks)?;
        Ok(())
    }

    /// Zero every parameter (the next run re-initializes).
    pub fn reset_params(&mut self) -> Result<(), AppError> {
        let ranks = self.ranks();
        self.reset_ranks(&ranks)
    }

    /// Set the same interior rank on every edge.
    pub fn set_uniform_rank(&mut self, rank: usize) -> Result<(), AppError> {
        let d = self.dim();
        let mut ranks = vec![rank; d + 1];
        ranks[0] = 1;
        ranks[d] = 1;
        self.reset_ranks(&ranks)
    }

    /// Change the number of basis functions of every dimension.
    pub fn set_nparam(&mut self, nparam: usize) -> Result<(), AppError> {
        if nparam == 0 {
            return Err(AppError::input("Number of basis functions must be >= 1."));
        }
        let dims: Vec<DimOpts> = self.dims().iter().map(|d| d.with_nparam(nparam)).collect();
        let ranks = self.ranks();
        self.param = FtParam::new(&dims, &ranks)?;
        Ok(())
    }

    pub fn set_reg_weight(&mut self, reg_weight: f64) -> Result<(), AppError> {
        if !(reg_weight.is_finite() && reg_weight >= 0.0) {
            return Err(AppError::input(format!(
                "Regularization weight must be >= 0 (got {reg_weight})."
            )));
        }
        self.opts.reg_weight = reg_weight;
        Ok(())
    }

    pub fn set_max_iter(&mut self, max_iter: usize) {
        self.opts.optimizer.max_iter = max_iter;
    }

    /// Fit to `data`, initializing from linear least squares when the
    /// parameters are still zero.
    pub fn run(&mut self, data: &Dataset) -> Result<&FunctionTrain, AppError> {
        if data.dim() != self.dim() {
            return Err(AppError::input(format!(
                "Data has dimension {}, model has dimension {}.",
                data.dim(),
                self.dim()
            )));
        }
        if self.param.is_zero() {
            let (perturb, seed) = (self.opts.perturb, self.opts.seed);
            self.param.init_linear_ls(data, perturb, seed)?;
        }
        if self.adapt.enabled {
            crate::fit::adapt::run_rank_adapt(self, data)?;
        } else {
            self.run_fixed(data)?;
        }
        Ok(self.param.ft())
    }

    /// One fixed-rank run from the current parameters.
    pub fn run_fixed(&mut self, data: &Dataset) -> Result<RunReport, AppError> {
        let report = match self.opts.alg {
            RegressAlg::Aio => self.run_aio(data)?,
            RegressAlg::Als => self.run_als(data)?,
        };
        if self.param.params().iter().any(|v| !v.is_finite()) {
            return Err(AppError::numeric("Regression produced non-finite parameters."));
        }
        if self.opts.verbose > 0 {
            info!(
                ranks = ?self.ranks(),
                objective = report.objective,
                iterations = report.iterations,
                converged = report.converged,
                "regression run finished"
            );
        }
        self.last_run = Some(report.clone());
        Ok(report)
    }

    fn run_aio(&mut self, data: &Dataset) -> Result<RunReport, AppError> {
        let objective = Objective::new(self.param.ft(), data, self.opts.obj, self.opts.reg_weight)?;
        let free = self.param.free_mask();
        let mut x = self.param.params();
        let mut work = self.param.ft().clone();

        let report = minimize(
            |p: &[f64], g: &mut [f64]| {
                if work.set_params(p).is_err() {
                    return f64::NAN;
                }
                objective.value_and_grad(&work, &free, g)
            },
            &mut x,
            &self.opts.optimizer,
        )?;
        self.param.set_params(&x)?;
        debug!(
            value = report.value,
            iterations = report.iterations,
            evals = report.n_evals,
            status = ?report.status,
            "all-at-once optimization"
        );

        Ok(RunReport {
            objective: report.value,
            iterations: report.iterations,
            converged: report.status.converged(),
        })
    }

    fn run_als(&mut self, data: &Dataset) -> Result<RunReport, AppError> {
        let objective = Objective::new(self.param.ft(), data, self.opts.obj, self.opts.reg_weight)?;
        let free = self.param.free_mask();
        let d = self.dim();

        let order: Vec<usize> = (0..d).chain((1..d.saturating_sub(1)).rev()).collect();
        let mut sweeps = 0;
        let mut converged = false;
        for sweep in 1..=self.opts.max_als_sweeps {
            let start = self.param.ft().clone();
            for &k in &order {
                self.update_core(&objective, &free, k)?;
            }
            sweeps = sweep;

            let diff = self.param.ft().norm2_diff(&start)?.sqrt();
            let norm = self.param.ft().norm2().sqrt();
            let rel = if norm > 0.0 { diff / norm } else { diff };
            if self.opts.verbose > 0 {
                info!(sweep, norm, diff, rel, "ALS sweep");
            }
            if rel < self.opts.als_conv_tol {
                converged = true;
                break;
            }
        }

        Ok(RunReport {
            objective: objective.value(self.param.ft()),
            iterations: sweeps,
            converged,
        })
    }

    /// Solve exactly for the free coefficients of core `k`.
    fn update_core(&mut self, objective: &Objective<'_>, free: &[bool], k: usize) -> Result<(), AppError> {
        let ft = self.param.ft();
        let data = objective.data();
        let table = objective.table();
        let core = ft.core(k);
        let (rl, rr, nparam) = (core.r_left, core.r_right, core.nparam);
        let ncoef = rl * rr * nparam;
        let offset = ft.core_offset(k);
        let core_free = &free[offset..offset + ncoef];

        let rows: Vec<Vec<f64>> = (0..data.len())
            .into_par_iter()
            .map_init(
                || SweepWork::new(ft),
                |work, i| {
                    work.compute(ft, table, i);
                    let phi = table.values(k, i);
                    let mut row = vec![0.0; ncoef];
                    for col in 0..rr {
                        for r in 0..rl {
                            let w = work.left[k][r] * work.right[k + 1][col];
                            let o = (col * rl + r) * nparam;
                            for l in 0..nparam {
                                row[o + l] = w * phi[l];
                            }
                        }
                    }
                    row
                },
            )
            .collect();

        let free_cols: Vec<usize> = (0..ncoef).filter(|&j| core_free[j]).collect();
        if free_cols.is_empty() {
            return Ok(());
        }

        let n = data.len();
        let mut a = DMatrix::<f64>::zeros(n, free_cols.len());
        let mut rhs = DVector::<f64>::zeros(n);
        for (i, row) in rows.iter().enumerate() {
            let mut frozen = 0.0;
            for (j, &v) in row.iter().enumerate() {
                if !core_free[j] {
                    frozen += v * core.coeffs[j];
                }
            }
            rhs[i] = data.y()[i] - frozen;
            for (c, &j) in free_cols.iter().enumerate() {
                a[(i, c)] = row[j];
            }
        }

        let penalty: Vec<f64> = match objective.obj() {
            RegressObj::Ls => vec![0.0; free_cols.len()],
            RegressObj::LsSparseL2 => {
                let scale = n as f64 * objective.reg_weight();
                let nu = objective.sq_norms(k);
                free_cols.iter().map(|&j| scale * nu[j % nparam]).collect()
            }
        };

        match solve_ridge(&a, &rhs, &penalty) {
            Some(sol) => {
                let core = self.param.ft_mut().core_mut(k);
                for (c, &j) in free_cols.iter().enumerate() {
                    core.coeffs[j] = sol[c];
                }
            }
            None => warn!(core = k, "ALS core solve failed; keeping previous coefficients"),
        }
        Ok(())
    }

    /// Summary of the current fit on `data`.
    pub fn summary(&self, data: &Dataset) -> Result<FitSummary, AppError> {
        let (train_rmse, train_rel_err) = training_error(self.ft(), data)?;
        let objective = match &self.last_run {
            Some(r) => r.objective,
            None => Objective::new(self.ft(), data, self.opts.obj, self.opts.reg_weight)?.value(self.ft()),
        };
        Ok(FitSummary {
            alg: self.opts.alg,
            obj: self.opts.obj,
            n_train: data.len(),
            ranks: self.ranks(),
            nparams: self.param.nparams(),
            objective,
            train_rmse,
            train_rel_err,
            cv_error: self.cv_error,
            adapt_history: self.history.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dims(d: usize, n: usize) -> Vec<DimOpts> {
        (0..d).map(|_| DimOpts::legendre(-1.0, 1.0, n).unwrap()).collect()
    }

    fn points(d: usize, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(42);
        (0..n * d).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn dataset(d: usize, n: usize, f: impl Fn(&[f64]) -> f64) -> Dataset {
        let x = points(d, n);
        let y = x.chunks(d).map(|r| f(r)).collect();
        Dataset::new(d, x, y).unwrap()
    }

    #[test]
    fn aio_recovers_sum_of_squares() {
        let data = dataset(3, 120, |x| x.iter().map(|v| v * v).sum());
        let mut reg = FtRegress::new(dims(3, 3), &[1, 2, 2, 1], RegressOpts::default()).unwrap();
        reg.run(&data).unwrap();
        for x in [[0.1, -0.4, 0.8], [-0.7, 0.2, 0.0]] {
            let expected: f64 = x.iter().map(|v| v * v).sum();
            assert!((reg.ft().eval(&x).unwrap() - expected).abs() < 1e-3);
        }
        let summary = reg.summary(&data).unwrap();
        assert!(summary.train_rel_err < 1e-6);
        assert_eq!(summary.ranks, vec![1, 2, 2, 1]);
    }

    #[test]
    fn als_recovers_product_function() {
        let data = dataset(3, 100, |x| (1.0 + x[0]) * (2.0 - x[1]) * (0.5 + x[2] * x[2]));
        let opts = RegressOpts {
            alg: RegressAlg::Als,
            max_als_sweeps: 30,
            ..RegressOpts::default()
        };
        let mut reg = FtRegress::new(dims(3, 3), &[1, 1, 1, 1], opts).unwrap();
        reg.param_mut().init_constant(1.0).unwrap();
        reg.run(&data).unwrap();
        let x = [0.3, -0.2, 0.6];
        let expected = 1.3 * 2.2 * (0.5 + 0.36);
        assert!((reg.ft().eval(&x).unwrap() - expected).abs() < 1e-6);
        assert!(reg.last_run().unwrap().converged);
    }

    #[test]
    fn sparse_penalty_shrinks_the_fit() {
        let data = dataset(2, 60, |x| 3.0 * x[0] + x[1]);
        let opts = RegressOpts {
            alg: RegressAlg::Als,
            obj: RegressObj::LsSparseL2,
            reg_weight: 1.0,
            ..RegressOpts::default()
        };
        let mut reg = FtRegress::new(dims(2, 2), &[1, 2, 1], opts).unwrap();
        reg.run(&data).unwrap();
        let penalized = reg.ft().norm2();

        let mut plain = FtRegress::new(dims(2, 2), &[1, 2, 1], RegressOpts::default()).unwrap();
        plain.run(&data).unwrap();
        assert!(penalized < plain.ft().norm2());
    }

    #[test]
    fn setters_reset_parameters() {
        let data = dataset(2, 30, |x| x[0] - x[1]);
        let mut reg = FtRegress::new(dims(2, 2), &[1, 2, 1], RegressOpts::default()).unwrap();
        reg.run(&data).unwrap();
        assert!(!reg.param().is_zero());

        reg.set_uniform_rank(3).unwrap();
        assert_eq!(reg.ranks(), vec![1, 3, 1]);
        assert!(reg.param().is_zero());

        reg.set_nparam(4).unwrap();
        assert_eq!(reg.dims()[1].nparam, 4);
        assert!(reg.set_nparam(0).is_err());
        assert!(reg.set_reg_weight(-1.0).is_err());
    }

    #[test]
    fn data_dimension_must_match() {
        let data = dataset(2, 10, |x| x[0]);
        let mut reg = FtRegress::new(dims(3, 2), &[1, 1, 1, 1], RegressOpts::default()).unwrap();
        assert_eq!(reg.run(&data).unwrap_err().exit_code(), 2);
    }
}
