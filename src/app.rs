//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - runs the requested workflow
//! - prints reports/plots
//! - writes optional model files and exports

use clap::Parser;
use tracing::warn;

use crate::cli::{Cli, CombineArgs, Command, DemoArgs, EvalArgs, FitArgs, InfoArgs, PlotArgs};
use crate::error::AppError;
use crate::io::{
    ModelFile, default_feature_names, load_points, parse_point, read_model_json, write_model_json,
    write_predictions_csv,
};
use crate::plot::{SliceSpec, default_anchor, render_slice_plot};
use crate::report::{
    compute_residual_stats, format_comparisons, format_fit_summary, format_model_info, format_predictions,
    format_residual_stats, max_abs_diff,
};

pub mod pipeline;

/// Entry point for the `ftr` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    crate::logging::init(cli.verbose)?;

    match cli.command {
        Command::Fit(args) => handle_fit(args, cli.verbose),
        Command::Eval(args) => handle_eval(args),
        Command::Combine(args) => handle_combine(args),
        Command::Info(args) => handle_info(args),
        Command::Plot(args) => handle_plot(args),
        Command::Demo(args) => handle_demo(args, cli.verbose),
    }
}

fn handle_fit(args: FitArgs, verbose: u8) -> Result<(), AppError> {
    let run = pipeline::run_fit(&args, verbose)?;
    let ft = run.model.ft()?;

    println!("{}", format_fit_summary(&run.ingest, &run.summary, ft));

    if args.plot {
        let spec = SliceSpec {
            dim: args.plot_dim,
            at: default_anchor(ft),
            range: None,
        };
        let data = &run.ingest.dataset;
        let points: Vec<(f64, f64)> = (0..data.len())
            .filter_map(|i| data.row(i).get(args.plot_dim).map(|&t| (t, data.y()[i])))
            .collect();
        println!("{}", render_slice_plot(ft, &spec, &points, args.width, args.height)?);
    }

    if let Some(path) = &args.out {
        let file = ModelFile::from_model(&run.model, Some(format!("fit {}", args.data.display())))?;
        write_model_json(path, &file)?;
        println!("Model written to {}", path.display());
    }
    if let Some(path) = &args.export {
        let data = &run.ingest.dataset;
        write_predictions_csv(path, &run.ingest.feature_names, data.x(), &run.predictions, Some(data.y()))?;
        println!("Predictions written to {}", path.display());
    }

    Ok(())
}

fn handle_eval(args: EvalArgs) -> Result<(), AppError> {
    let model = read_model_json(&args.model)?.into_model();
    let dim = model.dim();

    let (x, observed) = match (&args.point, &args.data) {
        (Some(p), _) => (parse_point(p)?, None),
        (None, Some(path)) => {
            let pts = load_points(path, dim, args.target.as_deref())?;
            if !pts.row_errors.is_empty() {
                warn!(skipped = pts.row_errors.len(), "skipped invalid rows");
            }
            (pts.x, pts.y)
        }
        (None, None) => return Err(AppError::input("Provide --point or --data.")),
    };
    if x.len() % dim != 0 {
        return Err(AppError::input(format!(
            "Point has {} coordinates, model has dimension {dim}.",
            x.len()
        )));
    }

    let predictions = model.eval_batch(&x)?;
    println!("{}", format_predictions(dim, &x, &predictions, args.limit));
    if let Some(y) = &observed {
        println!("{}", format_residual_stats(&compute_residual_stats(&predictions, y)?));
    }

    if let Some(path) = &args.export {
        write_predictions_csv(path, &default_feature_names(dim), &x, &predictions, observed.as_deref())?;
        println!("Predictions written to {}", path.display());
    }
    Ok(())
}

fn handle_combine(args: CombineArgs) -> Result<(), AppError> {
    let left = read_model_json(&args.left)?.into_model();
    let right = read_model_json(&args.right)?.into_model();
    let out = pipeline::run_combine(&args, &left, &right)?;

    let source = format!(
        "{:?} {} {}",
        args.op,
        args.left.display(),
        args.right.display()
    )
    .to_lowercase();
    let file = ModelFile::from_model(&out.model, Some(source))?;
    println!("{}", format_model_info(&file));
    if !out.checks.is_empty() {
        println!("{}", format_comparisons(&out.checks));
        println!("Max abs difference: {:.3e}", max_abs_diff(&out.checks));
    }
    write_model_json(&args.out, &file)?;
    println!("Model written to {}", args.out.display());
    Ok(())
}

fn handle_info(args: InfoArgs) -> Result<(), AppError> {
    let file = read_model_json(&args.model)?;
    println!("{}", format_model_info(&file));
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let model = read_model_json(&args.model)?.into_model();
    let ft = model.ft()?;

    let at = match &args.at {
        Some(s) => parse_point(s)?,
        None => default_anchor(ft),
    };
    let points = match &args.data {
        Some(path) => {
            let pts = load_points(path, ft.dim(), None)?;
            match &pts.y {
                Some(y) => pts
                    .x
                    .chunks(ft.dim())
                    .zip(y)
                    .filter_map(|(row, &v)| row.get(args.dim).map(|&t| (t, v)))
                    .collect(),
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };

    let spec = SliceSpec {
        dim: args.dim,
        at,
        range: None,
    };
    println!("{}", render_slice_plot(ft, &spec, &points, args.width, args.height)?);
    Ok(())
}

fn handle_demo(args: DemoArgs, verbose: u8) -> Result<(), AppError> {
    let out = pipeline::run_demo(&args, verbose)?;

    println!("=== ftr demo: d={} n={} ===", args.dim, args.ndata);
    for (name, s) in [args.first.name(), args.second.name()].iter().zip(&out.summaries) {
        println!(
            "{name:<16} ranks={:?} train_rel_err={:.3e}{}",
            s.ranks,
            s.train_rel_err,
            s.cv_error.map(|e| format!(" cv_error={e:.3e}")).unwrap_or_default()
        );
    }
    println!("\nSurrogates vs. true functions:");
    println!("{}", format_comparisons(&out.truth));
    println!("Combined surrogates vs. pointwise results:");
    println!("{}", format_comparisons(&out.consistency));
    Ok(())
}
