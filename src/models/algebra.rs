//! Sums and products of function trains.
//!
//! - Sum: cores are block diagonal (first core concatenates columns, last core
//!   stacks rows), so interior ranks add.
//! - Product: cores are Kronecker products of univariate functions, so ranks
//!   multiply and every univariate product is projected exactly into
//!   `n_a + n_b - 1` basis functions.
//!
//! Neither operation rounds. Call `round` afterwards to compress.

use crate::error::AppError;
use crate::math::project_product;
use crate::models::core::Core;
use crate::models::train::FunctionTrain;

/// `a + b`.
pub fn sum(a: &FunctionTrain, b: &FunctionTrain) -> Result<FunctionTrain, AppError> {
    a.check_compatible(b)?;
    let d = a.dim();
    let mut cores = Vec::with_capacity(d);

    for k in 0..d {
        let ca = a.core(k);
        let cb = b.core(k);
        let nparam = ca.nparam.max(cb.nparam);

        let core = if d == 1 {
            let mut core = Core::zeros(1, 1, nparam);
            let out = core.func_mut(0, 0);
            for (l, v) in ca.func(0, 0).iter().enumerate() {
                out[l] += v;
            }
            for (l, v) in cb.func(0, 0).iter().enumerate() {
                out[l] += v;
            }
            core
        } else if k == 0 {
            let mut core = Core::zeros(1, ca.r_right + cb.r_right, nparam);
            for col in 0..ca.r_right {
                core.set_func(0, col, ca.func(0, col));
            }
            for col in 0..cb.r_right {
                core.set_func(0, ca.r_right + col, cb.func(0, col));
            }
            core
        } else if k == d - 1 {
            let mut core = Core::zeros(ca.r_left + cb.r_left, 1, nparam);
            for row in 0..ca.r_left {
                core.set_func(row, 0, ca.func(row, 0));
            }
            for row in 0..cb.r_left {
                core.set_func(ca.r_left + row, 0, cb.func(row, 0));
            }
            core
        } else {
            let mut core = Core::zeros(ca.r_left + cb.r_left, ca.r_right + cb.r_right, nparam);
            for col in 0..ca.r_right {
                for row in 0..ca.r_left {
                    core.set_func(row, col, ca.func(row, col));
                }
            }
            for col in 0..cb.r_right {
                for row in 0..cb.r_left {
                    core.set_func(ca.r_left + row, ca.r_right + col, cb.func(row, col));
                }
            }
            core
        };
        cores.push(core);
    }

    FunctionTrain::from_cores(a.dims().to_vec(), cores)
}

/// `a - b`.
pub fn difference(a: &FunctionTrain, b: &FunctionTrain) -> Result<FunctionTrain, AppError> {
    sum(a, &b.scaled(-1.0))
}

/// `a * b` (pointwise).
pub fn product(a: &FunctionTrain, b: &FunctionTrain) -> Result<FunctionTrain, AppError> {
    a.check_compatible(b)?;
    let d = a.dim();
    let mut cores = Vec::with_capacity(d);

    for k in 0..d {
        let ca = a.core(k);
        let cb = b.core(k);
        let kind = a.dims()[k].kind;
        let nparam = ca.nparam + cb.nparam - 1;
        let rl = ca.r_left * cb.r_left;
        let rr = ca.r_right * cb.r_right;
        let mut core = Core::zeros(rl, rr, nparam);

        for beta in 0..ca.r_right {
            for beta2 in 0..cb.r_right {
                let col = beta * cb.r_right + beta2;
                for alpha in 0..ca.r_left {
                    let fa = ca.func(alpha, beta);
                    if fa.iter().all(|&v| v == 0.0) {
                        continue;
                    }
                    for alpha2 in 0..cb.r_left {
                        let fb = cb.func(alpha2, beta2);
                        if fb.iter().all(|&v| v == 0.0) {
                            continue;
                        }
                        let row = alpha * cb.r_left + alpha2;
                        core.set_func(row, col, &project_product(kind, fa, fb));
                    }
                }
            }
        }
        cores.push(core);
    }

    FunctionTrain::from_cores(a.dims().to_vec(), cores)
}
