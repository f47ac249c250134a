//! k-fold cross-validation and grid search over regression settings.
//!
//! Folds are contiguous blocks of `N / kfold` rows; the last fold also takes
//! the remainder. Each fold trains a clone of the regressor (so the caller's
//! parameters never change) and the error is the relative squared error over
//! every held-out row:
//!
//! ```text
//! err = sum (y - f)^2 / sum y^2
//! ```

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::Dataset;
use crate::error::AppError;
use crate::fit::regress::FtRegress;

/// Relative margin a grid case must beat the incumbent by.
const IMPROVEMENT_FACTOR: f64 = 0.999_999_999;

#[derive(Debug, Clone)]
pub struct CrossValidate<'a> {
    data: &'a Dataset,
    kfold: usize,
}

impl<'a> CrossValidate<'a> {
    pub fn new(data: &'a Dataset, kfold: usize) -> Result<Self, AppError> {
        if kfold < 2 {
            return Err(AppError::input(format!("Cross-validation needs kfold >= 2 (got {kfold}).")));
        }
        if data.len() < kfold {
            return Err(AppError::data(format!(
                "Cross-validation with {kfold} folds needs at least {kfold} rows (got {}).",
                data.len()
            )));
        }
        Ok(Self { data, kfold })
    }

    pub fn kfold(&self) -> usize {
        self.kfold
    }

    /// `(start, len)` of every held-out block.
    pub fn folds(&self) -> Vec<(usize, usize)> {
        let n = self.data.len();
        let batch = n / self.kfold;
        (0..self.kfold)
            .map(|i| {
                let start = i * batch;
                let len = if i + 1 == self.kfold { n - start } else { batch };
                (start, len)
            })
            .collect()
    }

    /// Cross-validation error of `reg` as currently configured.
    pub fn run(&self, reg: &FtRegress) -> Result<f64, AppError> {
        let parts: Vec<(f64, f64)> = self
            .folds()
            .par_iter()
            .map(|&(start, len)| {
                let (train, test) = self.data.split_rows(start, len);
                let train = train.into_dataset()?;
                let mut local = reg.clone();
                let ft = local.run(&train)?;

                let preds = ft.eval_batch(&test.x)?;
                let mut err = 0.0;
                let mut norm = 0.0;
                for (p, y) in preds.iter().zip(&test.y) {
                    err += (y - p) * (y - p);
                    norm += y * y;
                }
                debug!(start, len, err = err / len as f64, norm = norm / len as f64, "fold");
                Ok((err, norm))
            })
            .collect::<Result<_, AppError>>()?;

        let err: f64 = parts.iter().map(|p| p.0).sum();
        let norm: f64 = parts.iter().map(|p| p.1).sum();
        if !err.is_finite() {
            return Err(AppError::numeric("Non-finite cross-validation error."));
        }
        Ok(if norm > 0.0 { err / norm } else { err })
    }
}

/// One regression setting to sweep over.
#[derive(Debug, Clone, PartialEq)]
pub enum CvParam {
    /// Interior rank (applied to every edge).
    Rank(Vec<usize>),
    /// Number of basis functions (applied to every dimension).
    NumParam(Vec<usize>),
    OptMaxIter(Vec<usize>),
    RegWeight(Vec<f64>),
}

impl CvParam {
    pub fn name(&self) -> &'static str {
        match self {
            CvParam::Rank(_) => "rank",
            CvParam::NumParam(_) => "num_param",
            CvParam::OptMaxIter(_) => "opt_maxiter",
            CvParam::RegWeight(_) => "reg_weight",
        }
    }

    fn len(&self) -> usize {
        match self {
            CvParam::Rank(v) | CvParam::NumParam(v) | CvParam::OptMaxIter(v) => v.len(),
            CvParam::RegWeight(v) => v.len(),
        }
    }
}

/// One point of the grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CvCase {
    pub rank: Option<usize>,
    pub num_param: Option<usize>,
    pub opt_maxiter: Option<usize>,
    pub reg_weight: Option<f64>,
}

impl CvCase {
    /// Apply this case to `reg`. Parameters restart from zero.
    pub fn apply(&self, reg: &mut FtRegress) -> Result<(), AppError> {
        if let Some(n) = self.num_param {
            reg.set_nparam(n)?;
        }
        if let Some(r) = self.rank {
            if r == 0 {
                return Err(AppError::input("Grid ranks must be >= 1."));
            }
            reg.set_uniform_rank(r)?;
        }
        if let Some(it) = self.opt_maxiter {
            reg.set_max_iter(it);
        }
        if let Some(w) = self.reg_weight {
            reg.set_reg_weight(w)?;
        }
        reg.reset_params()
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(r) = self.rank {
            parts.push(format!("rank={r}"));
        }
        if let Some(n) = self.num_param {
            parts.push(format!("num_param={n}"));
        }
        if let Some(it) = self.opt_maxiter {
            parts.push(format!("opt_maxiter={it}"));
        }
        if let Some(w) = self.reg_weight {
            parts.push(format!("reg_weight={w:.5e}"));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvGridResult {
    pub best: CvCase,
    pub best_error: f64,
    pub cases: Vec<(CvCase, f64)>,
}

/// Evaluate every combination of `params` and apply the best one to `reg`.
pub fn grid_search(
    cv: &CrossValidate<'_>,
    reg: &mut FtRegress,
    params: &[CvParam],
) -> Result<CvGridResult, AppError> {
    let cases = expand_grid(params)?;
    let verbose = reg.opts().verbose;

    let mut best: Option<(usize, f64)> = None;
    let mut results = Vec::with_capacity(cases.len());
    for (idx, case) in cases.iter().enumerate() {
        let mut local = reg.clone();
        case.apply(&mut local)?;
        let err = cv.run(&local)?;
        if verbose > 0 {
            info!(case = %case.describe(), cv_error = err, "cross-validation case");
        }
        let replace = match best {
            None => true,
            Some((_, b)) => err < b * IMPROVEMENT_FACTOR,
        };
        if replace {
            best = Some((idx, err));
        }
        results.push((case.clone(), err));
    }

    let Some((idx, best_error)) = best else {
        return Err(AppError::input("Cross-validation grid is empty."));
    };
    let best = cases[idx].clone();
    best.apply(reg)?;
    reg.cv_error = Some(best_error);
    if verbose > 0 {
        info!(case = %best.describe(), cv_error = best_error, "best cross-validation case");
    }

    Ok(CvGridResult {
        best,
        best_error,
        cases: results,
    })
}

/// Cartesian product of the parameter lists, first parameter varying slowest.
fn expand_grid(params: &[CvParam]) -> Result<Vec<CvCase>, AppError> {
    if params.is_empty() {
        return Err(AppError::input("Cross-validation grid has no parameters."));
    }
    for (i, p) in params.iter().enumerate() {
        if p.len() == 0 {
            return Err(AppError::input(format!("Grid parameter '{}' has no values.", p.name())));
        }
        if params[..i].iter().any(|q| q.name() == p.name()) {
            return Err(AppError::input(format!(
                "Grid parameter '{}' is given more than once.",
                p.name()
            )));
        }
    }

    let mut cases = vec![CvCase::default()];
    for p in params {
        let mut next = Vec::with_capacity(cases.len() * p.len());
        for case in &cases {
            for j in 0..p.len() {
                let mut c = case.clone();
                match p {
                    CvParam::Rank(v) => c.rank = Some(v[j]),
                    CvParam::NumParam(v) => c.num_param = Some(v[j]),
                    CvParam::OptMaxIter(v) => c.opt_maxiter = Some(v[j]),
                    CvParam::RegWeight(v) => c.reg_weight = Some(v[j]),
                }
                next.push(c);
            }
        }
        cases = next;
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DimOpts;
    use crate::fit::regress::RegressOpts;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn data(n: usize, f: impl Fn(&[f64]) -> f64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(3);
        let x: Vec<f64> = (0..2 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y = x.chunks(2).map(|r| f(r)).collect();
        Dataset::new(2, x, y).unwrap()
    }

    fn regressor(nparam: usize) -> FtRegress {
        let dims = vec![DimOpts::legendre(-1.0, 1.0, nparam).unwrap(); 2];
        FtRegress::new(dims, &[1, 2, 1], RegressOpts::default()).unwrap()
    }

    #[test]
    fn folds_cover_every_row_once() {
        let d = data(23, |x| x[0]);
        let cv = CrossValidate::new(&d, 5).unwrap();
        let folds = cv.folds();
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0], (0, 4));
        assert_eq!(folds[4], (16, 7));
        assert_eq!(folds.iter().map(|f| f.1).sum::<usize>(), 23);
    }

    #[test]
    fn invalid_fold_counts_are_rejected() {
        let d = data(3, |x| x[0]);
        assert_eq!(CrossValidate::new(&d, 1).unwrap_err().exit_code(), 2);
        assert_eq!(CrossValidate::new(&d, 4).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn cv_is_deterministic_and_leaves_regressor_untouched() {
        let d = data(60, |x| x[0] * x[0] + x[1]);
        let cv = CrossValidate::new(&d, 5).unwrap();
        let reg = regressor(3);
        let before = reg.param().params();
        let e1 = cv.run(&reg).unwrap();
        let e2 = cv.run(&reg).unwrap();
        assert_eq!(e1, e2);
        assert!(e1 < 1e-6);
        assert_eq!(reg.param().params(), before);
    }

    #[test]
    fn grid_expands_cartesian_product() {
        let cases = expand_grid(&[CvParam::Rank(vec![1, 2]), CvParam::RegWeight(vec![0.1, 0.2, 0.3])]).unwrap();
        assert_eq!(cases.len(), 6);
        assert_eq!(cases[0].rank, Some(1));
        assert_eq!(cases[0].reg_weight, Some(0.1));
        assert_eq!(cases[5].rank, Some(2));
        assert_eq!(cases[5].reg_weight, Some(0.3));
    }

    #[test]
    fn duplicate_or_empty_grid_parameters_are_rejected() {
        assert!(expand_grid(&[]).is_err());
        assert!(expand_grid(&[CvParam::Rank(vec![])]).is_err());
        let err = expand_grid(&[CvParam::Rank(vec![1]), CvParam::Rank(vec![2])]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn grid_search_picks_enough_basis_functions() {
        // A quadratic in x0 needs three Legendre polynomials.
        let d = data(80, |x| 1.0 + x[0] * x[0] - 0.5 * x[1]);
        let cv = CrossValidate::new(&d, 4).unwrap();
        let mut reg = regressor(2);
        let result = grid_search(&cv, &mut reg, &[CvParam::NumParam(vec![2, 3])]).unwrap();
        assert_eq!(result.best.num_param, Some(3));
        assert_eq!(reg.dims()[0].nparam, 3);
        assert!(reg.param().is_zero());
        assert_eq!(result.cases.len(), 2);
    }
}
