//! Shared workflow logic behind the CLI commands.
//!
//! Keeping this in one place keeps `app.rs` focused on presentation
//! (printing, writing files) while the workflows stay testable:
//!
//! - fit: CSV ingest -> configure -> build -> predictions
//! - combine: load -> add/multiply -> optional rounding -> pointwise checks
//! - demo: synthetic data -> two fits -> sum/product -> comparisons

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Uniform};
use tracing::info;

use crate::cli::{CombineArgs, CombineOp, DemoArgs, FitArgs, ModelArgs, SamplingArg};
use crate::data::{Sampling, SyntheticConfig, generate};
use crate::domain::FitSummary;
use crate::error::AppError;
use crate::io::{IngestedData, load_dataset};
use crate::math::BasisKind;
use crate::models::FunctionTrain;
use crate::report::Comparison;
use crate::surrogate::{BuildOptions, FtModel};

/// All computed outputs of a single `ftr fit` run.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub ingest: IngestedData,
    pub model: FtModel,
    pub summary: FitSummary,
    pub predictions: Vec<f64>,
}

/// Result of `ftr combine`.
#[derive(Debug, Clone)]
pub struct CombineOutput {
    pub model: FtModel,
    pub checks: Vec<Comparison>,
}

/// Result of `ftr demo`.
#[derive(Debug, Clone)]
pub struct DemoOutput {
    pub summaries: [FitSummary; 2],
    pub test_point: Vec<f64>,
    /// Surrogates (and their sum/product) against the true functions.
    pub truth: Vec<Comparison>,
    /// Combined surrogates against pointwise sums/products of the operands.
    pub consistency: Vec<Comparison>,
}

pub fn build_options(args: &ModelArgs, adapt_rank: bool, verbose: u8) -> BuildOptions {
    BuildOptions {
        alg: args.alg,
        obj: args.obj,
        adapt_rank,
        kick_rank: args.kick_rank,
        round_tol: args.round_tol,
        max_rank: args.max_rank,
        verbose: verbose as usize,
        reg_weight: args.reg_weight,
        als_max_sweeps: args.als_sweeps,
        kfold: args.kfold,
        opt_maxiter: args.maxiter,
        seed: args.seed,
        ..BuildOptions::default()
    }
}

/// Unbuilt model with the same basis on every dimension.
pub fn configure_model(dim: usize, args: &ModelArgs) -> Result<FtModel, AppError> {
    let mut model = FtModel::new(dim)?;
    for i in 0..dim {
        model.set_dim_opts(i, args.basis.name(), args.lb, args.ub, args.nparam)?;
    }
    if args.rank == 0 {
        return Err(AppError::input("Rank must be >= 1."));
    }
    let mut ranks = vec![args.rank; dim + 1];
    ranks[0] = 1;
    ranks[dim] = 1;
    model.set_ranks(&ranks)?;
    Ok(model)
}

/// Execute the fit workflow and return the computed outputs.
pub fn run_fit(args: &FitArgs, verbose: u8) -> Result<FitOutput, AppError> {
    let ingest = load_dataset(&args.data, args.target.as_deref())?;
    let data = &ingest.dataset;
    info!(rows = data.len(), dim = data.dim(), skipped = ingest.row_errors.len(), "loaded training data");

    let mut opts = build_options(&args.model, args.adapt_rank, verbose);
    opts.cv_rank = non_empty(&args.cv_rank);
    opts.cv_num_param = non_empty(&args.cv_num_param);
    opts.cv_reg_weight = non_empty(&args.cv_reg_weight);
    opts.cv_opt_maxiter = non_empty(&args.cv_opt_maxiter);

    let mut model = configure_model(data.dim(), &args.model)?;
    let summary = model.build_data_model(data, &opts)?;
    let predictions = model.eval_batch(data.x())?;

    Ok(FitOutput {
        ingest,
        model,
        summary,
        predictions,
    })
}

/// Combine two loaded models and check the result at random points.
pub fn run_combine(args: &CombineArgs, left: &FtModel, right: &FtModel) -> Result<CombineOutput, AppError> {
    let combined = match args.op {
        CombineOp::Add => (left + right)?,
        CombineOp::Mul => (left * right)?,
    };
    let model = match args.round_tol {
        Some(tol) => combined.round(tol)?,
        None => combined,
    };
    info!(op = ?args.op, ranks = ?model.ranks(), "combined models");

    let points = random_points(model.ft()?, args.check, args.seed)?;
    let mut checks = Vec::with_capacity(points.len());
    for x in points {
        let (a, b) = (left.eval(&x)?, right.eval(&x)?);
        let expected = match args.op {
            CombineOp::Add => a + b,
            CombineOp::Mul => a * b,
        };
        checks.push(Comparison {
            label: format!("{:?}", args.op).to_lowercase(),
            actual: model.eval(&x)?,
            point: x,
            expected,
        });
    }
    Ok(CombineOutput { model, checks })
}

/// Fit two synthetic targets on shared inputs, combine the surrogates and
/// compare everything at one random test point.
pub fn run_demo(args: &DemoArgs, verbose: u8) -> Result<DemoOutput, AppError> {
    let sampling = match args.sampling {
        SamplingArg::Uniform => Sampling::Uniform {
            lb: args.model.lb,
            ub: args.model.ub,
        },
        SamplingArg::Normal => Sampling::StandardNormal,
    };
    let config = SyntheticConfig {
        dim: args.dim,
        n: args.ndata,
        sampling,
        noise: 0.0,
        seed: args.data_seed,
    };
    let data1 = generate(&config, args.first)?;
    let data2 = generate(&config, args.second)?;
    let opts = build_options(&args.model, !args.no_adapt, verbose);

    let mut m1 = configure_model(args.dim, &args.model)?;
    let s1 = m1.build_data_model(&data1, &opts)?;
    let mut m2 = configure_model(args.dim, &args.model)?;
    let s2 = m2.build_data_model(&data2, &opts)?;

    let m3 = (&m1 + &m2)?;
    let m4 = (&m1 * &m2)?;

    let test_point = random_points(m1.ft()?, 1, args.data_seed.wrapping_add(1))?
        .pop()
        .ok_or_else(|| AppError::input("No test point drawn."))?;
    let f1 = args.first.eval(&test_point);
    let f2 = args.second.eval(&test_point);
    let (e1, e2) = (m1.eval(&test_point)?, m2.eval(&test_point)?);
    let (e3, e4) = (m3.eval(&test_point)?, m4.eval(&test_point)?);

    let cmp = |label: &str, expected: f64, actual: f64| Comparison {
        label: label.to_string(),
        point: test_point.clone(),
        expected,
        actual,
    };
    let truth = vec![
        cmp(args.first.name(), f1, e1),
        cmp(args.second.name(), f2, e2),
        cmp("sum", f1 + f2, e3),
        cmp("product", f1 * f2, e4),
    ];
    let consistency = vec![cmp("sum", e1 + e2, e3), cmp("product", e1 * e2, e4)];

    Ok(DemoOutput {
        summaries: [s1, s2],
        test_point,
        truth,
        consistency,
    })
}

/// `n` points drawn from the domain of `ft` (uniform on Legendre bounds,
/// standard normal on Hermite dimensions).
pub fn random_points(ft: &FunctionTrain, n: usize, seed: u64) -> Result<Vec<Vec<f64>>, AppError> {
    if let Some((k, d)) = ft
        .dims()
        .iter()
        .enumerate()
        .find(|(_, d)| d.kind == BasisKind::Legendre && !(d.lb.is_finite() && d.ub.is_finite() && d.lb < d.ub))
    {
        return Err(AppError::input(format!(
            "Cannot sample dimension {k}: empty domain [{}, {}].",
            d.lb, d.ub
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::numeric(format!("Sampling distribution error: {e}")))?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let x = ft
            .dims()
            .iter()
            .map(|d| match d.kind {
                BasisKind::Legendre => Uniform::new(d.lb, d.ub).sample(&mut rng),
                BasisKind::Hermite => normal.sample(&mut rng),
            })
            .collect();
        out.push(x);
    }
    Ok(out)
}

fn non_empty<T: Clone>(v: &[T]) -> Option<Vec<T>> {
    if v.is_empty() { None } else { Some(v.to_vec()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TargetFn;
    use crate::domain::{RegressAlg, RegressObj};
    use crate::report::max_abs_diff;

    fn model_args() -> ModelArgs {
        ModelArgs {
            basis: BasisKind::Legendre,
            lb: -1.0,
            ub: 1.0,
            nparam: 3,
            rank: 2,
            alg: RegressAlg::Aio,
            obj: RegressObj::Ls,
            reg_weight: 1e-10,
            als_sweeps: 20,
            maxiter: 2000,
            kick_rank: 1,
            round_tol: 1e-8,
            max_rank: 4,
            kfold: 4,
            seed: 0,
        }
    }

    #[test]
    fn demo_matches_truth_for_polynomial_targets() {
        let args = DemoArgs {
            dim: 3,
            ndata: 120,
            sampling: SamplingArg::Uniform,
            first: TargetFn::Sum,
            second: TargetFn::SumSquares,
            no_adapt: true,
            data_seed: 3,
            model: model_args(),
        };
        let out = run_demo(&args, 0).unwrap();
        assert_eq!(out.test_point.len(), 3);
        assert!(max_abs_diff(&out.consistency) < 1e-9);
        assert!(max_abs_diff(&out.truth) < 1e-3, "{:?}", out.truth);
        assert!(out.summaries[1].train_rel_err < 1e-6);
    }

    #[test]
    fn random_points_respect_bounds() {
        let dims = vec![crate::domain::DimOpts::legendre(2.0, 3.0, 2).unwrap(); 2];
        let ft = FunctionTrain::constant(&dims, 1.0).unwrap();
        let pts = random_points(&ft, 10, 1).unwrap();
        assert_eq!(pts.len(), 10);
        assert!(pts.iter().flatten().all(|v| (2.0..3.0).contains(v)));
        assert_eq!(pts, random_points(&ft, 10, 1).unwrap());
    }

    #[test]
    fn random_points_reject_an_empty_domain() {
        let dims = vec![crate::domain::DimOpts::legendre(-1.0, 1.0, 2).unwrap(); 2];
        let ft = FunctionTrain::constant(&dims, 1.0).unwrap();
        let mut value = serde_json::to_value(&ft).unwrap();
        value["dims"][1]["ub"] = serde_json::json!(-1.0);
        let reversed: FunctionTrain = serde_json::from_value(value).unwrap();
        let err = random_points(&reversed, 3, 0).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn combine_saved_models_matches_pointwise_results() {
        use crate::domain::DimOpts;
        use crate::io::{ModelFile, read_model_json, write_model_json};

        let dims = vec![DimOpts::legendre(-1.0, 1.0, 3).unwrap(), DimOpts::hermite(2).unwrap()];
        let a = FunctionTrain::linear(&dims, &[1.0, 2.0], &[0.5, -0.25]).unwrap();
        let b = FunctionTrain::linear(&dims, &[-0.5, 1.0], &[1.0, 0.0]).unwrap();

        let dir = std::env::temp_dir().join(format!("ftr_combine_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (left_path, right_path) = (dir.join("a.json"), dir.join("b.json"));
        for (path, ft) in [(&left_path, &a), (&right_path, &b)] {
            let file = ModelFile::from_model(&FtModel::from_ft(ft.clone(), None), None).unwrap();
            write_model_json(path, &file).unwrap();
        }
        let left = read_model_json(&left_path).unwrap().into_model();
        let right = read_model_json(&right_path).unwrap().into_model();

        for (op, round_tol) in [(CombineOp::Add, None), (CombineOp::Mul, None), (CombineOp::Mul, Some(1e-10))] {
            let args = CombineArgs {
                op,
                left: left_path.clone(),
                right: right_path.clone(),
                round_tol,
                out: dir.join("out.json"),
                check: 6,
                seed: 11,
            };
            let out = run_combine(&args, &left, &right).unwrap();
            assert_eq!(out.checks.len(), 6);
            assert!(max_abs_diff(&out.checks) < 1e-8, "{op:?}: {:?}", out.checks);

            let x = [0.4, -1.3];
            let (fa, fb) = (a.eval(&x).unwrap(), b.eval(&x).unwrap());
            let expected = match op {
                CombineOp::Add => fa + fb,
                CombineOp::Mul => fa * fb,
            };
            assert!((out.model.eval(&x).unwrap() - expected).abs() < 1e-8);
        }
    }

    #[test]
    fn configure_model_sets_uniform_ranks() {
        let m = configure_model(3, &model_args()).unwrap();
        assert_eq!(m.ranks(), vec![1, 2, 2, 1]);
        let bad = ModelArgs { rank: 0, ..model_args() };
        assert!(configure_model(3, &bad).is_err());
    }
}
