//! Rank adaptation.
//!
//! Starting from the current ranks, each iteration:
//!
//! - fits at the current ranks and rounds the result,
//! - "kicks" every edge whose rank survived rounding (the model may need more),
//! - refits at the new ranks and compares cross-validation errors.
//!
//! The search stops when rounding reduces every edge, when the kicked ranks
//! would put every edge at `max_rank`, or when a kick makes the
//! cross-validation error worse (the rounded model of the previous step is
//! kept in that case).

use tracing::info;

use crate::domain::{AdaptStep, Dataset};
use crate::error::AppError;
use crate::fit::cross_validate::CrossValidate;
use crate::fit::regress::FtRegress;
use crate::models::round;

const MAX_ADAPT_ITERS: usize = 10;
/// Value of the coefficients a kick adds when the old ones are kept.
const KICK_FILL: f64 = 1e-4;

pub(crate) fn run_rank_adapt(reg: &mut FtRegress, data: &Dataset) -> Result<(), AppError> {
    reg.set_adapt_enabled(false);
    let result = adapt_loop(reg, data);
    reg.set_adapt_enabled(true);
    result
}

fn adapt_loop(reg: &mut FtRegress, data: &Dataset) -> Result<(), AppError> {
    let opts = reg.adapt_opts().clone();
    let verbose = reg.opts().verbose;
    let d = reg.dim();
    let cv = CrossValidate::new(data, opts.kfold)?;

    reg.history.clear();
    let mut err = cv.run(reg)?;
    reg.run(data)?;
    let mut ranks = reg.ranks();
    if verbose > 0 {
        info!(?ranks, cv_error = err, "rank adaptation start");
    }

    for iteration in 1..=MAX_ADAPT_ITERS {
        let rounded = round(reg.ft(), opts.round_tol)?;
        let rounded_ranks = rounded.ranks();

        let mut restrict = rounded_ranks.clone();
        restrict[0] = 1;
        restrict[d] = 1;
        let mut new_ranks = rounded_ranks.clone();
        let mut kicked = false;
        for k in 1..d {
            if rounded_ranks[k] == ranks[k] {
                new_ranks[k] = (ranks[k] + opts.kick_rank).min(opts.max_rank);
                kicked |= new_ranks[k] > ranks[k];
            }
        }
        let saturated = (1..d).all(|k| new_ranks[k] >= opts.max_rank);
        if !kicked || saturated {
            if verbose > 0 {
                info!(iteration, ?rounded_ranks, "rank adaptation stopped: no edge to enlarge");
            }
            break;
        }

        reg.reset_ranks(&new_ranks)?;
        if opts.opt_restricted {
            reg.param_mut().embed(&rounded, KICK_FILL);
            reg.param_mut().set_restrict(restrict)?;
        }

        let new_err = cv.run(reg)?;
        let accepted = new_err <= err;
        reg.history.push(AdaptStep {
            iteration,
            rounded_ranks: rounded_ranks.clone(),
            new_ranks: new_ranks.clone(),
            cv_error: new_err,
            accepted,
        });
        if verbose > 0 {
            info!(iteration, ?rounded_ranks, ?new_ranks, cv_error = new_err, accepted, "rank adaptation step");
        }

        if !accepted {
            reg.reset_ranks(&rounded_ranks)?;
            reg.param_mut().set_params(&rounded.params())?;
            break;
        }
        reg.run(data)?;
        err = new_err;
        ranks = new_ranks;
    }

    if opts.finalize {
        reg.param_mut().clear_restrict();
        reg.run(data)?;
    }
    reg.cv_error = Some(err);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::{Dataset, DimOpts};
    use crate::fit::regress::{AdaptOpts, FtRegress, RegressOpts};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dataset(n: usize, f: impl Fn(&[f64]) -> f64) -> Dataset {
        let mut rng = StdRng::seed_from_u64(17);
        let x: Vec<f64> = (0..3 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y = x.chunks(3).map(|r| f(r)).collect();
        Dataset::new(3, x, y).unwrap()
    }

    fn regressor(opt_restricted: bool) -> FtRegress {
        regressor_with(AdaptOpts {
            enabled: true,
            kick_rank: 1,
            round_tol: 1e-5,
            max_rank: 4,
            kfold: 4,
            opt_restricted,
            finalize: true,
        })
    }

    fn regressor_with(adapt: AdaptOpts) -> FtRegress {
        let dims = vec![DimOpts::legendre(-1.0, 1.0, 3).unwrap(); 3];
        let mut reg = FtRegress::new(dims, &[1, 1, 1, 1], RegressOpts::default()).unwrap();
        reg.set_adapt(adapt).unwrap();
        reg
    }

    #[test]
    fn adaptation_grows_rank_for_additive_function() {
        let data = dataset(150, |x| x.iter().map(|v| v * v).sum());
        let mut reg = regressor(false);
        reg.run(&data).unwrap();

        assert!(reg.adapt_opts().enabled);
        assert!(!reg.history.is_empty());
        let ranks = reg.ranks();
        assert!(ranks[1] >= 2 && ranks[2] >= 2, "ranks {ranks:?}");
        let x = [0.2, -0.5, 0.7];
        let expected = 0.04 + 0.25 + 0.49;
        assert!((reg.ft().eval(&x).unwrap() - expected).abs() < 1e-3);
        assert!(reg.cv_error.unwrap() < 1e-4);

        // Only the last step may be a rejected kick, and then the rounded ranks are kept.
        let (last, earlier) = reg.history.split_last().unwrap();
        assert!(earlier.iter().all(|s| s.accepted));
        if !last.accepted {
            assert_eq!(reg.ranks(), last.rounded_ranks);
        }
    }

    #[test]
    fn kick_into_max_rank_everywhere_stops_before_fitting() {
        let data = dataset(60, |x| x[0] + x[1] + x[2]);
        let mut reg = regressor_with(AdaptOpts {
            enabled: true,
            kick_rank: 1,
            round_tol: 1e-5,
            max_rank: 2,
            kfold: 3,
            opt_restricted: false,
            finalize: false,
        });
        reg.run(&data).unwrap();
        assert!(reg.history.is_empty());
        assert_eq!(reg.ranks(), vec![1, 1, 1, 1]);
        assert!(reg.cv_error.is_some());
    }

    #[test]
    fn rejected_kick_reverts_to_the_rounded_fit() {
        // Pure noise: the enlarged model interpolates its training folds and
        // cross-validates worse than the rank-1 fit.
        let mut rng = StdRng::seed_from_u64(5);
        let n = 24;
        let x: Vec<f64> = (0..3 * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let data = Dataset::new(3, x, y).unwrap();

        let mut reg = regressor_with(AdaptOpts {
            enabled: true,
            kick_rank: 1,
            round_tol: 1e-5,
            max_rank: 4,
            kfold: 3,
            opt_restricted: false,
            finalize: false,
        });
        reg.run(&data).unwrap();

        let rejected = reg.history.iter().position(|s| !s.accepted).expect("a rejected kick");
        assert_eq!(rejected, reg.history.len() - 1);
        let step = &reg.history[rejected];
        assert!(step.new_ranks.iter().zip(&step.rounded_ranks).any(|(n, r)| n > r));
        assert_eq!(reg.ranks(), step.rounded_ranks);
        assert!(reg.cv_error.unwrap() < step.cv_error);
    }

    #[test]
    fn restricted_adaptation_clears_the_restriction_when_finalizing() {
        let data = dataset(120, |x| x[0] * x[0] + x[1] * x[2]);
        let mut reg = regressor(true);
        reg.run(&data).unwrap();
        assert!(!reg.param().is_restricted());
        assert!(reg.ranks().iter().all(|&r| r <= 4));
    }

    #[test]
    fn adaptation_needs_enough_rows_for_folds() {
        let data = dataset(3, |x| x[0]);
        let mut reg = regressor(false);
        assert_eq!(reg.run(&data).unwrap_err().exit_code(), 3);
        assert!(reg.adapt_opts().enabled);
    }
}
