//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (snapshot-friendly)

use crate::domain::{DimOpts, FitSummary};
use crate::io::{IngestedData, ModelFile};
use crate::math::BasisKind;
use crate::models::FunctionTrain;
use crate::report::{Comparison, ResidualStats};

/// Dataset stats + fit diagnostics + adaptation history.
pub fn format_fit_summary(ingest: &IngestedData, summary: &FitSummary, ft: &FunctionTrain) -> String {
    let mut out = String::new();

    out.push_str("=== ftr - function-train regression ===\n");
    out.push_str(&format!(
        "Data: n={} used / {} read | features=[{}] | target={}\n",
        ingest.rows_used,
        ingest.rows_read,
        ingest.feature_names.join(", "),
        ingest.target_name
    ));
    if !ingest.row_errors.is_empty() {
        out.push_str(&format!("Skipped rows: {}\n", ingest.row_errors.len()));
        for e in ingest.row_errors.iter().take(5) {
            out.push_str(&format!("  line {}: {}\n", e.line, e.message));
        }
        if ingest.row_errors.len() > 5 {
            out.push_str(&format!("  ... {} more\n", ingest.row_errors.len() - 5));
        }
    }
    out.push_str(&format!("y: [{:.4}, {:.4}]\n", ingest.stats.y_min, ingest.stats.y_max));

    out.push_str("\nDimensions:\n");
    out.push_str(&format_dims(ft.dims(), Some(&ingest.feature_names)));

    out.push_str("\nFit:\n");
    out.push_str(&format!(
        "- alg={:?} obj={:?} ranks={} params={}\n",
        summary.alg,
        summary.obj,
        fmt_ranks(&summary.ranks),
        summary.nparams
    ));
    out.push_str(&format!(
        "- objective={:.6e} train_rmse={:.6e} train_rel_err={:.6e}\n",
        summary.objective, summary.train_rmse, summary.train_rel_err
    ));
    if let Some(cv) = summary.cv_error {
        out.push_str(&format!("- cv_error={cv:.6e}\n"));
    }

    if !summary.adapt_history.is_empty() {
        out.push_str("\nRank adaptation:\n");
        out.push_str(&format!("{:>4} {:<20} {:<20} {:>14} {:>8}\n", "iter", "rounded", "new", "cv_error", "kept"));
        out.push_str(&format!("{:-<4} {:-<20} {:-<20} {:-<14} {:-<8}\n", "", "", "", "", ""));
        for s in &summary.adapt_history {
            out.push_str(&format!(
                "{:>4} {:<20} {:<20} {:>14.6e} {:>8}\n",
                s.iteration,
                fmt_ranks(&s.rounded_ranks),
                fmt_ranks(&s.new_ranks),
                s.cv_error,
                if s.accepted { "yes" } else { "no" }
            ));
        }
    }

    out
}

/// Header, provenance and structure of a saved model.
pub fn format_model_info(file: &ModelFile) -> String {
    let ft = &file.ft;
    let mut out = String::new();
    out.push_str(&format!("Model: {} (created {})\n", file.tool, file.created_at.to_rfc3339()));
    if let Some(src) = &file.source {
        out.push_str(&format!("Source: {src}\n"));
    }
    out.push_str(&format!(
        "Dimension: {} | ranks={} | max rank={} | params={}\n",
        ft.dim(),
        fmt_ranks(&ft.ranks()),
        ft.max_rank(),
        ft.nparams()
    ));
    out.push_str(&format!("Integral: {:.10e}\n", ft.integrate()));
    out.push_str(&format!("L2 norm : {:.10e}\n", ft.norm2().sqrt()));
    out.push_str("\nDimensions:\n");
    out.push_str(&format_dims(ft.dims(), None));
    if let Some(s) = &file.summary {
        out.push_str(&format!(
            "\nFit: alg={:?} obj={:?} n_train={} train_rel_err={:.6e}",
            s.alg, s.obj, s.n_train, s.train_rel_err
        ));
        if let Some(cv) = s.cv_error {
            out.push_str(&format!(" cv_error={cv:.6e}"));
        }
        out.push('\n');
    }
    out
}

/// One row per evaluated point.
pub fn format_predictions(dim: usize, x: &[f64], predictions: &[f64], limit: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<40} {:>16}\n", "x", "f(x)"));
    out.push_str(&format!("{:-<40} {:-<16}\n", "", ""));
    for (row, f) in x.chunks(dim).zip(predictions).take(limit) {
        out.push_str(&format!("{:<40} {:>16.8e}\n", truncate(&fmt_vec(row), 40), f));
    }
    if predictions.len() > limit {
        out.push_str(&format!("... {} more\n", predictions.len() - limit));
    }
    out
}

pub fn format_residual_stats(stats: &ResidualStats) -> String {
    format!(
        "Residuals: n={} rmse={:.6e} max_abs={:.6e} rel_err={:.6e}\n",
        stats.n, stats.rmse, stats.max_abs, stats.rel_err
    )
}

/// Table of expected vs. actual values.
pub fn format_comparisons(comparisons: &[Comparison]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:<32} {:>16} {:>16} {:>12}\n",
            "check", "x", "expected", "actual", "abs_diff"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<32} {:-<16} {:-<16} {:-<12}\n", "", "", "", "", "").trim_end());
    out.push('\n');
    for c in comparisons {
        out.push_str(&format!(
            "{:<10} {:<32} {:>16.8e} {:>16.8e} {:>12.3e}\n",
            truncate(&c.label, 10),
            truncate(&fmt_vec(&c.point), 32),
            c.expected,
            c.actual,
            c.abs_diff()
        ));
    }
    out
}

fn format_dims(dims: &[DimOpts], names: Option<&[String]>) -> String {
    let mut out = String::new();
    for (i, d) in dims.iter().enumerate() {
        let name = names
            .and_then(|n| n.get(i))
            .map(|s| s.as_str())
            .unwrap_or("");
        let domain = match d.kind {
            BasisKind::Legendre => format!("[{:.4}, {:.4}]", d.lb, d.ub),
            BasisKind::Hermite => "N(0, 1)".to_string(),
        };
        out.push_str(
            format!("  {i:>3} {:<12} {:<9} {:<24} nparam={}", truncate(name, 12), d.kind.name(), domain, d.nparam)
                .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_ranks(r: &[usize]) -> String {
    let parts: Vec<String> = r.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_table_has_header_and_rows() {
        let txt = format_comparisons(&[Comparison {
            label: "sum".into(),
            point: vec![0.5, -0.25],
            expected: 1.0,
            actual: 1.0,
        }]);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("check"));
        assert!(lines[2].contains("[0.5000, -0.2500]"));
    }

    #[test]
    fn predictions_are_limited() {
        let txt = format_predictions(1, &[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 2);
        assert!(txt.ends_with("... 1 more\n"));
        assert_eq!(txt.lines().count(), 5);
    }

    #[test]
    fn truncate_marks_cut_strings() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }

    #[test]
    fn dims_table_shows_domains() {
        let dims = vec![DimOpts::legendre(0.0, 2.0, 3).unwrap(), DimOpts::hermite(4).unwrap()];
        let txt = format_dims(&dims, None);
        assert!(txt.contains("legendre"));
        assert!(txt.contains("[0.0000, 2.0000]"));
        assert!(txt.contains("N(0, 1)"));
        assert!(txt.contains("nparam=4"));
    }
}
