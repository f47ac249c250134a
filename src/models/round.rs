//! Rounding (rank compression) of function trains.
//!
//! The coefficients are first rescaled by `sqrt(||φ_l||^2)` so that the basis is
//! orthonormal and the L2 norm of the function equals the Euclidean norm of its
//! (orthogonalized) coefficient tensor. Rounding then proceeds as for discrete
//! tensor trains:
//!
//! 1. right-to-left QR sweep so that cores `2..d` are right-orthogonal and the
//!    whole norm sits in the first core
//! 2. left-to-right truncated SVD sweep, discarding singular values whose tail
//!    norm is at most `tol * ||f|| / sqrt(d - 1)` at each of the `d - 1` edges
//!
//! The result approximates the input within relative L2 error `tol`.

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::AppError;
use crate::models::core::Core;
use crate::models::train::FunctionTrain;

/// Compress `ft` to relative L2 accuracy `tol`.
pub fn round(ft: &FunctionTrain, tol: f64) -> Result<FunctionTrain, AppError> {
    if !(tol.is_finite() && tol >= 0.0) {
        return Err(AppError::input(format!("Rounding tolerance must be >= 0 (got {tol}).")));
    }
    let d = ft.dim();
    if d == 1 {
        return Ok(ft.clone());
    }

    let dims = ft.dims();
    let mut cores: Vec<Core> = ft.cores().to_vec();
    for (core, dim) in cores.iter_mut().zip(dims) {
        let scale: Vec<f64> = (0..core.nparam).map(|l| dim.sq_norm(l).sqrt()).collect();
        for f in 0..core.nfuncs() {
            for l in 0..core.nparam {
                core.coeffs[f * core.nparam + l] *= scale[l];
            }
        }
    }

    // Right-to-left orthogonalization.
    for k in (1..d).rev() {
        let m = right_unfolding(&cores[k]);
        let qr = m.transpose().qr();
        let q = qr.q();
        let r = qr.r();
        let new_rank = q.ncols();
        cores[k] = from_right_unfolding(&q.transpose(), cores[k].nparam, cores[k].r_right);
        // G_{k-1} <- G_{k-1} R^T
        let left = left_unfolding(&cores[k - 1]);
        let merged = left * r.transpose();
        cores[k - 1] = from_left_unfolding(&merged, cores[k - 1].r_left, cores[k - 1].nparam);
        debug_assert_eq!(cores[k - 1].r_right, new_rank);
    }

    let norm = cores[0].coeff_norm();
    if !norm.is_finite() {
        return Err(AppError::numeric("Non-finite function train norm during rounding."));
    }
    let delta = tol * norm / ((d - 1) as f64).sqrt();

    // Left-to-right truncation.
    for k in 0..d - 1 {
        let m = left_unfolding(&cores[k]);
        let svd = m.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(AppError::numeric("SVD failed during rounding."));
        };
        let sv = svd.singular_values;

        let mut order: Vec<usize> = (0..sv.len()).collect();
        order.sort_by(|&a, &b| sv[b].partial_cmp(&sv[a]).unwrap_or(std::cmp::Ordering::Equal));
        let sorted: Vec<f64> = order.iter().map(|&i| sv[i]).collect();
        let keep = truncation_rank(&sorted, delta);

        let mut u_keep = DMatrix::<f64>::zeros(u.nrows(), keep);
        let mut sv_t = DMatrix::<f64>::zeros(keep, v_t.ncols());
        for (j, &i) in order.iter().take(keep).enumerate() {
            u_keep.set_column(j, &u.column(i));
            sv_t.set_row(j, &(v_t.row(i) * sv[i]));
        }

        let (rl, n) = (cores[k].r_left, cores[k].nparam);
        cores[k] = from_left_unfolding(&u_keep, rl, n);
        let next = right_unfolding(&cores[k + 1]);
        let merged = sv_t * next;
        cores[k + 1] = from_right_unfolding(&merged, cores[k + 1].nparam, cores[k + 1].r_right);
    }

    for (core, dim) in cores.iter_mut().zip(dims) {
        let scale: Vec<f64> = (0..core.nparam).map(|l| dim.sq_norm(l).sqrt()).collect();
        for f in 0..core.nfuncs() {
            for l in 0..core.nparam {
                core.coeffs[f * core.nparam + l] /= scale[l];
            }
        }
    }

    let out = FunctionTrain::from_cores(dims.to_vec(), cores)?;
    debug!(from = ?ft.ranks(), to = ?out.ranks(), tol, "rounded function train");
    Ok(out)
}

/// Smallest `r >= 1` whose discarded tail `sqrt(sum_{i >= r} s_i^2)` is at most
/// `delta`. `sorted` must be in descending order.
fn truncation_rank(sorted: &[f64], delta: f64) -> usize {
    let mut tail = 0.0;
    let mut keep = sorted.len();
    for i in (1..sorted.len()).rev() {
        tail += sorted[i] * sorted[i];
        if tail.sqrt() <= delta {
            keep = i;
        } else {
            break;
        }
    }
    keep.max(1)
}

/// `(r_left * nparam) x r_right` matrix with row index `row * nparam + l`.
fn left_unfolding(core: &Core) -> DMatrix<f64> {
    let (rl, rr, n) = (core.r_left, core.r_right, core.nparam);
    DMatrix::from_fn(rl * n, rr, |i, col| {
        let (row, l) = (i / n, i % n);
        core.coeffs[core.offset(row, col) + l]
    })
}

fn from_left_unfolding(m: &DMatrix<f64>, r_left: usize, nparam: usize) -> Core {
    let mut core = Core::zeros(r_left, m.ncols(), nparam);
    for col in 0..m.ncols() {
        for row in 0..r_left {
            let o = core.offset(row, col);
            for l in 0..nparam {
                core.coeffs[o + l] = m[(row * nparam + l, col)];
            }
        }
    }
    core
}

/// `r_left x (r_right * nparam)` matrix with column index `col * nparam + l`.
fn right_unfolding(core: &Core) -> DMatrix<f64> {
    let (rl, rr, n) = (core.r_left, core.r_right, core.nparam);
    DMatrix::from_fn(rl, rr * n, |row, j| {
        let (col, l) = (j / n, j % n);
        core.coeffs[core.offset(row, col) + l]
    })
}

fn from_right_unfolding(m: &DMatrix<f64>, nparam: usize, r_right: usize) -> Core {
    let mut core = Core::zeros(m.nrows(), r_right, nparam);
    for col in 0..r_right {
        for row in 0..m.nrows() {
            let o = core.offset(row, col);
            for l in 0..nparam {
                core.coeffs[o + l] = m[(row, col * nparam + l)];
            }
        }
    }
    core
}
