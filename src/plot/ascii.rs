//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a surrogate in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! A plot shows a 1D slice `t -> f(at[0], .., t, .., at[d-1])` along one
//! dimension. Plot elements:
//! - model slice: `-` line
//! - optional observed points (projected onto the slice dimension): `o`

use crate::error::AppError;
use crate::math::BasisKind;
use crate::models::FunctionTrain;

/// Range shown for Hermite dimensions (standard normal inputs).
const HERMITE_RANGE: (f64, f64) = (-3.0, 3.0);

/// A slice request: which dimension to sweep and where to pin the others.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    pub dim: usize,
    /// Values of every coordinate; `at[dim]` is ignored.
    pub at: Vec<f64>,
    /// Sweep range; defaults to the dimension's domain.
    pub range: Option<(f64, f64)>,
}

/// Render the slice of `ft` described by `spec`, overlaying `points`
/// (`(x_dim, y)` pairs).
pub fn render_slice_plot(
    ft: &FunctionTrain,
    spec: &SliceSpec,
    points: &[(f64, f64)],
    width: usize,
    height: usize,
) -> Result<String, AppError> {
    let d = ft.dim();
    if spec.dim >= d {
        return Err(AppError::input(format!(
            "Plot dimension {} out of range for a {d}-dimensional model.",
            spec.dim
        )));
    }
    if spec.at.len() != d {
        return Err(AppError::input(format!(
            "Slice point has {} coordinates, model has dimension {d}.",
            spec.at.len()
        )));
    }
    let (t_min, t_max) = match spec.range {
        Some(r) => r,
        None => default_range(ft, spec.dim),
    };
    if !(t_min.is_finite() && t_max.is_finite() && t_min < t_max) {
        return Err(AppError::input(format!("Invalid plot range [{t_min}, {t_max}].")));
    }

    let width = width.max(10);
    let height = height.max(5);
    let curve = sample_slice(ft, spec, t_min, t_max, width)?;

    let (y_min, y_max) = y_range(points, &curve).unwrap_or((-1.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    draw_curve(&mut grid, &curve, t_min, t_max, y_min, y_max);

    for &(t, y) in points {
        if t < t_min || t > t_max {
            continue;
        }
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        grid[yy][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x{}=[{t_min:.3}, {t_max:.3}] | f=[{y_min:.2}, {y_max:.2}]",
        spec.dim
    ));
    if d > 1 {
        let fixed: Vec<String> = spec
            .at
            .iter()
            .enumerate()
            .map(|(i, v)| if i == spec.dim { "*".to_string() } else { format!("{v:.3}") })
            .collect();
        out.push_str(&format!(" | at=({})", fixed.join(", ")));
    }
    out.push('\n');

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    Ok(out)
}

/// Domain of dimension `k`: `[lb, ub]` for Legendre, `[-3, 3]` for Hermite.
pub fn default_range(ft: &FunctionTrain, k: usize) -> (f64, f64) {
    let dim = &ft.dims()[k];
    match dim.kind {
        BasisKind::Legendre => (dim.lb, dim.ub),
        BasisKind::Hermite => HERMITE_RANGE,
    }
}

/// Midpoint of every dimension's plotting range.
pub fn default_anchor(ft: &FunctionTrain) -> Vec<f64> {
    (0..ft.dim())
        .map(|k| {
            let (a, b) = default_range(ft, k);
            0.5 * (a + b)
        })
        .collect()
}

fn sample_slice(
    ft: &FunctionTrain,
    spec: &SliceSpec,
    t_min: f64,
    t_max: f64,
    n: usize,
) -> Result<Vec<(f64, f64)>, AppError> {
    let n = n.max(2);
    let mut x = spec.at.clone();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let u = i as f64 / (n as f64 - 1.0);
        let t = t_min + u * (t_max - t_min);
        x[spec.dim] = t;
        let y = ft.eval(&x)?;
        if !y.is_finite() {
            return Err(AppError::numeric("Non-finite model value while plotting."));
        }
        out.push((t, y));
    }
    Ok(out)
}

fn y_range(points: &[(f64, f64)], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in points.iter().chain(curve) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        // Flat slice: center it.
        Some((min_y - 1.0, min_y + 1.0))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DimOpts;

    #[test]
    fn plot_golden_snapshot_linear_slice() {
        let dims = vec![DimOpts::legendre(-1.0, 1.0, 2).unwrap()];
        let ft = FunctionTrain::linear(&dims, &[1.0], &[0.0]).unwrap();
        let spec = SliceSpec {
            dim: 0,
            at: vec![0.0],
            range: None,
        };
        let txt = render_slice_plot(&ft, &spec, &[], 10, 5).unwrap();
        let expected = concat!(
            "Plot: x0=[-1.000, 1.000] | f=[-1.10, 1.10]\n",
            "         -\n",
            "      --- \n",
            "    --    \n",
            " ---      \n",
            "-         \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn plot_marks_points_and_pinned_coordinates() {
        let dims = vec![DimOpts::legendre(0.0, 2.0, 2).unwrap(); 2];
        let ft = FunctionTrain::linear(&dims, &[1.0, 1.0], &[0.0, 0.0]).unwrap();
        let spec = SliceSpec {
            dim: 1,
            at: default_anchor(&ft),
            range: None,
        };
        assert_eq!(spec.at, vec![1.0, 1.0]);
        let txt = render_slice_plot(&ft, &spec, &[(0.0, 3.0)], 20, 8).unwrap();
        assert!(txt.lines().next().unwrap().ends_with("| at=(1.000, *)"));
        assert!(txt.contains('o'));
        assert_eq!(txt.lines().count(), 9);
    }

    #[test]
    fn plot_rejects_bad_requests() {
        let dims = vec![DimOpts::hermite(2).unwrap(); 2];
        let ft = FunctionTrain::constant(&dims, 1.0).unwrap();
        assert_eq!(default_range(&ft, 0), (-3.0, 3.0));
        let bad_dim = SliceSpec { dim: 2, at: vec![0.0, 0.0], range: None };
        assert!(render_slice_plot(&ft, &bad_dim, &[], 10, 5).is_err());
        let bad_at = SliceSpec { dim: 0, at: vec![0.0], range: None };
        assert!(render_slice_plot(&ft, &bad_at, &[], 10, 5).is_err());
        let bad_range = SliceSpec { dim: 0, at: vec![0.0, 0.0], range: Some((1.0, 1.0)) };
        assert!(render_slice_plot(&ft, &bad_range, &[], 10, 5).is_err());
        // Constant slices still render.
        let ok = SliceSpec { dim: 0, at: vec![0.0, 0.0], range: None };
        assert!(render_slice_plot(&ft, &ok, &[], 10, 5).is_ok());
    }
}
