//! A single function-train core.
//!
//! Core `k` is an `r_left x r_right` matrix of univariate functions of `x_k`,
//! each expanded in the same `nparam` basis functions. Coefficients are stored
//! column-major by function and contiguous per function:
//!
//! ```text
//! coeffs[(col * r_left + row) * nparam + l]
//! ```
//!
//! which is also the order in which the regression code flattens parameters.

use serde::{Deserialize, Serialize};

use crate::domain::DimOpts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Core {
    pub r_left: usize,
    pub r_right: usize,
    pub nparam: usize,
    pub coeffs: Vec<f64>,
}

impl Core {
    pub fn zeros(r_left: usize, r_right: usize, nparam: usize) -> Self {
        Self {
            r_left,
            r_right,
            nparam,
            coeffs: vec![0.0; r_left * r_right * nparam],
        }
    }

    pub fn nfuncs(&self) -> usize {
        self.r_left * self.r_right
    }

    /// Offset of the first coefficient of function `(row, col)`.
    pub fn offset(&self, row: usize, col: usize) -> usize {
        (col * self.r_left + row) * self.nparam
    }

    pub fn func(&self, row: usize, col: usize) -> &[f64] {
        let o = self.offset(row, col);
        &self.coeffs[o..o + self.nparam]
    }

    pub fn func_mut(&mut self, row: usize, col: usize) -> &mut [f64] {
        let o = self.offset(row, col);
        let n = self.nparam;
        &mut self.coeffs[o..o + n]
    }

    /// Copy `src` into function `(row, col)`, truncating or zero padding.
    pub fn set_func(&mut self, row: usize, col: usize, src: &[f64]) {
        let dst = self.func_mut(row, col);
        dst.fill(0.0);
        let n = dst.len().min(src.len());
        dst[..n].copy_from_slice(&src[..n]);
    }

    /// Evaluate every univariate function given the basis values `phi`
    /// (length `nparam`). `out` receives the matrix in the same column-major
    /// order as the coefficients.
    pub fn eval_with_basis(&self, phi: &[f64], out: &mut [f64]) {
        for (f, o) in out.iter_mut().enumerate().take(self.nfuncs()) {
            let c = &self.coeffs[f * self.nparam..(f + 1) * self.nparam];
            *o = c.iter().zip(phi).map(|(a, b)| a * b).sum();
        }
    }

    /// `v^T G(x)`: contract a row vector of length `r_left` with the core
    /// evaluated at basis values `phi`.
    pub fn contract_left(&self, v: &[f64], phi: &[f64], out: &mut [f64]) {
        for (col, o) in out.iter_mut().enumerate().take(self.r_right) {
            let mut acc = 0.0;
            for (row, &vr) in v.iter().enumerate().take(self.r_left) {
                let c = self.func(row, col);
                let g: f64 = c.iter().zip(phi).map(|(a, b)| a * b).sum();
                acc += vr * g;
            }
            *o = acc;
        }
    }

    /// Matrix of integrals of every univariate function (column-major).
    pub fn integral_matrix(&self, dim: &DimOpts) -> Vec<f64> {
        let w0 = dim.basis_integral(0);
        (0..self.nfuncs())
            .map(|f| self.coeffs[f * self.nparam] * w0)
            .collect()
    }

    /// Frobenius norm of the coefficient array.
    pub fn coeff_norm(&self) -> f64 {
        self.coeffs.iter().map(|c| c * c).sum::<f64>().sqrt()
    }
}

/// L2 inner product of two univariate expansions in the same dimension.
pub fn uni_inner(dim: &DimOpts, a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(l, (x, y))| x * y * dim.sq_norm(l))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_column_major_by_function() {
        let mut core = Core::zeros(2, 3, 4);
        core.func_mut(1, 2)[3] = 7.0;
        assert_eq!(core.coeffs[(2 * 2 + 1) * 4 + 3], 7.0);
        assert_eq!(core.func(1, 2), &[0.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn contract_left_matches_matrix_product() {
        // G = [[1, 2], [3, 4]] as constant functions, v = [1, -1]
        let mut core = Core::zeros(2, 2, 1);
        core.set_func(0, 0, &[1.0]);
        core.set_func(0, 1, &[2.0]);
        core.set_func(1, 0, &[3.0]);
        core.set_func(1, 1, &[4.0]);
        let mut out = [0.0; 2];
        core.contract_left(&[1.0, -1.0], &[1.0], &mut out);
        assert_eq!(out, [-2.0, -2.0]);
    }

    #[test]
    fn uni_inner_uses_physical_norms() {
        let dim = DimOpts::legendre(0.0, 2.0, 3).unwrap();
        // ∫_0^2 1 dx = 2
        assert!((uni_inner(&dim, &[1.0], &[1.0]) - 2.0).abs() < 1e-14);
        // ∫_0^2 (x - 1)^2 dx = 2/3
        assert!((uni_inner(&dim, &[0.0, 1.0], &[0.0, 1.0]) - 2.0 / 3.0).abs() < 1e-14);
    }
}
