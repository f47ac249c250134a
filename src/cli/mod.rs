//! Command-line parsing for the function-train regression tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::data::TargetFn;
use crate::domain::{RegressAlg, RegressObj};
use crate::math::BasisKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ftr", version, about = "Function-train regression: fit, evaluate and combine surrogates")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a surrogate to a CSV dataset and optionally save/plot/export it.
    Fit(FitArgs),
    /// Evaluate a saved model at a point or on a CSV of points.
    Eval(EvalArgs),
    /// Add or multiply two saved models.
    Combine(CombineArgs),
    /// Print the structure of a saved model.
    Info(InfoArgs),
    /// Plot a 1D slice of a saved model.
    Plot(PlotArgs),
    /// Fit two synthetic targets, combine them and compare against the truth.
    Demo(DemoArgs),
}

/// Basis and optimizer settings shared by `fit` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Polynomial family for every dimension.
    #[arg(long, value_enum, default_value_t = BasisKind::Legendre)]
    pub basis: BasisKind,

    /// Lower bound of every Legendre dimension.
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    pub lb: f64,

    /// Upper bound of every Legendre dimension.
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub ub: f64,

    /// Number of basis functions per dimension.
    #[arg(long, default_value_t = 4)]
    pub nparam: usize,

    /// Starting interior rank.
    #[arg(long, default_value_t = 2)]
    pub rank: usize,

    /// Optimization algorithm.
    #[arg(long, value_enum, default_value_t = RegressAlg::Aio)]
    pub alg: RegressAlg,

    /// Regression objective.
    #[arg(long, value_enum, default_value_t = RegressObj::Ls)]
    pub obj: RegressObj,

    /// Regularization weight of the sparse-L2 objective.
    #[arg(long, default_value_t = 1e-10)]
    pub reg_weight: f64,

    /// Maximum ALS sweeps.
    #[arg(long, default_value_t = 20)]
    pub als_sweeps: usize,

    /// Maximum L-BFGS iterations.
    #[arg(long, default_value_t = 2000)]
    pub maxiter: usize,

    /// Rank increase applied by each adaptation step.
    #[arg(long, default_value_t = 2)]
    pub kick_rank: usize,

    /// Rounding tolerance of rank adaptation.
    #[arg(long, default_value_t = 1e-5)]
    pub round_tol: f64,

    /// Rank ceiling of rank adaptation.
    #[arg(long, default_value_t = 10)]
    pub max_rank: usize,

    /// Number of cross-validation folds.
    #[arg(long, default_value_t = 5)]
    pub kfold: usize,

    /// Seed of the initialization perturbation.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Options for fitting a dataset.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Training CSV (header row; numeric columns).
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Target column (default: `y`, else the last column).
    #[arg(long)]
    pub target: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Grow ranks by cross-validated kicks.
    #[arg(long)]
    pub adapt_rank: bool,

    /// Cross-validate over these interior ranks (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub cv_rank: Vec<usize>,

    /// Cross-validate over these basis sizes.
    #[arg(long, value_delimiter = ',')]
    pub cv_num_param: Vec<usize>,

    /// Cross-validate over these regularization weights.
    #[arg(long, value_delimiter = ',')]
    pub cv_reg_weight: Vec<f64>,

    /// Cross-validate over these L-BFGS iteration limits.
    #[arg(long, value_delimiter = ',')]
    pub cv_opt_maxiter: Vec<usize>,

    /// Save the fitted model as JSON.
    #[arg(long, value_name = "JSON")]
    pub out: Option<PathBuf>,

    /// Export training predictions to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Render an ASCII slice plot along `--plot-dim`.
    #[arg(long)]
    pub plot: bool,

    /// Dimension swept by the plot.
    #[arg(long, default_value_t = 0)]
    pub plot_dim: usize,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

/// Options for evaluating a saved model.
#[derive(Debug, Parser)]
pub struct EvalArgs {
    /// Model JSON produced by `ftr fit --out`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Single point, comma separated (e.g. "0.1,-0.4,0.8").
    #[arg(long, allow_hyphen_values = true, conflicts_with = "data", required_unless_present = "data")]
    pub point: Option<String>,

    /// CSV of points; a target column enables residual statistics.
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Target column of `--data`.
    #[arg(long)]
    pub target: Option<String>,

    /// Export predictions to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Rows shown in the terminal.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CombineOp {
    Add,
    Mul,
}

/// Options for combining two models.
#[derive(Debug, Parser)]
pub struct CombineArgs {
    #[arg(long, value_enum)]
    pub op: CombineOp,

    #[arg(long, value_name = "JSON")]
    pub left: PathBuf,

    #[arg(long, value_name = "JSON")]
    pub right: PathBuf,

    /// Round the result with this relative tolerance.
    #[arg(long)]
    pub round_tol: Option<f64>,

    /// Output model JSON.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,

    /// Random points at which the result is checked against the operands.
    #[arg(long, default_value_t = 5)]
    pub check: usize,

    /// Seed of the check points.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Options for printing a saved model.
#[derive(Debug, Parser)]
pub struct InfoArgs {
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,
}

/// Options for plotting a saved model.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Dimension to sweep.
    #[arg(long, default_value_t = 0)]
    pub dim: usize,

    /// Values of the other coordinates (default: domain midpoints).
    #[arg(long, allow_hyphen_values = true)]
    pub at: Option<String>,

    /// Overlay the points of this CSV (projected onto `--dim`).
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SamplingArg {
    /// Uniform on `[lb, ub]`.
    Uniform,
    /// Standard normal.
    Normal,
}

/// Options for the synthetic end-to-end demo.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Input dimension.
    #[arg(long, default_value_t = 5)]
    pub dim: usize,

    /// Number of training samples.
    #[arg(long, default_value_t = 500)]
    pub ndata: usize,

    /// Input distribution of the training data.
    #[arg(long, value_enum, default_value_t = SamplingArg::Uniform)]
    pub sampling: SamplingArg,

    /// First target.
    #[arg(long, value_enum, default_value_t = TargetFn::Sum)]
    pub first: TargetFn,

    /// Second target.
    #[arg(long, value_enum, default_value_t = TargetFn::SumSquares)]
    pub second: TargetFn,

    /// Fit at fixed ranks instead of adapting them.
    #[arg(long)]
    pub no_adapt: bool,

    /// Seed of the synthetic data and the test point.
    #[arg(long, default_value_t = 7)]
    pub data_seed: u64,

    #[command(flatten)]
    pub model: ModelArgs,
}
