//! Gauss quadrature rules for the supported polynomial families.
//!
//! Rules are computed with the Golub–Welsch method: the nodes are the
//! eigenvalues of the symmetric tridiagonal Jacobi matrix of the three-term
//! recurrence, and the weights are `μ0 * v_0^2` where `v_0` is the first
//! component of each normalized eigenvector.
//!
//! An `n`-point rule integrates polynomials of degree `2n - 1` exactly, which is
//! what makes products of expansions projectable without error.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::math::basis::BasisKind;

/// A quadrature rule in reference coordinates.
#[derive(Debug, Clone)]
pub struct GaussRule {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Gauss–Legendre rule on `[-1, 1]` (weights sum to 2).
pub fn gauss_legendre(n: usize) -> GaussRule {
    golub_welsch(n, 2.0, |k| {
        let k = k as f64;
        k / (4.0 * k * k - 1.0).sqrt()
    })
}

/// Gauss–Hermite rule for the standard normal measure (weights sum to 1).
pub fn gauss_hermite_prob(n: usize) -> GaussRule {
    golub_welsch(n, 1.0, |k| (k as f64).sqrt())
}

/// Rule of `n` points matching the measure of `kind`.
pub fn gauss_rule(kind: BasisKind, n: usize) -> GaussRule {
    match kind {
        BasisKind::Legendre => gauss_legendre(n),
        BasisKind::Hermite => gauss_hermite_prob(n),
    }
}

/// Coefficients of the product of two expansions in the same family.
///
/// The product of expansions with `a.len()` and `b.len()` terms is a polynomial
/// with `a.len() + b.len() - 1` terms, so projecting it with a rule of that
/// many points is exact.
pub fn project_product(kind: BasisKind, a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let n = a.len() + b.len() - 1;
    let rule = gauss_rule(kind, n);

    let mut phi = vec![0.0; n];
    let mut out = vec![0.0; n];
    for (&t, &w) in rule.nodes.iter().zip(&rule.weights) {
        kind.eval(t, &mut phi);
        let fa: f64 = a.iter().zip(&phi).map(|(c, p)| c * p).sum();
        let fb: f64 = b.iter().zip(&phi).map(|(c, p)| c * p).sum();
        let h = w * fa * fb;
        for (m, o) in out.iter_mut().enumerate() {
            *o += h * phi[m];
        }
    }
    for (m, o) in out.iter_mut().enumerate() {
        *o /= kind.ref_sq_norm(m);
    }
    out
}

/// Build a rule from the off-diagonal entries `b(k)`, `k = 1..n`, of a Jacobi
/// matrix with zero diagonal (both families are symmetric).
fn golub_welsch(n: usize, mu0: f64, off_diag: impl Fn(usize) -> f64) -> GaussRule {
    if n == 0 {
        return GaussRule {
            nodes: Vec::new(),
            weights: Vec::new(),
        };
    }
    if n == 1 {
        return GaussRule {
            nodes: vec![0.0],
            weights: vec![mu0],
        };
    }

    let mut jacobi = DMatrix::<f64>::zeros(n, n);
    for k in 1..n {
        let b = off_diag(k);
        jacobi[(k - 1, k)] = b;
        jacobi[(k, k - 1)] = b;
    }

    let eig = SymmetricEigen::new(jacobi);
    let mut pairs: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let v0 = eig.eigenvectors[(0, i)];
            (eig.eigenvalues[i], mu0 * v0 * v0)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    GaussRule {
        nodes: pairs.iter().map(|p| p.0).collect(),
        weights: pairs.iter().map(|p| p.1).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legendre_three_point_rule() {
        let rule = gauss_legendre(3);
        let r = (3.0f64 / 5.0).sqrt();
        assert!((rule.nodes[0] + r).abs() < 1e-12);
        assert!(rule.nodes[1].abs() < 1e-12);
        assert!((rule.nodes[2] - r).abs() < 1e-12);
        assert!((rule.weights[0] - 5.0 / 9.0).abs() < 1e-12);
        assert!((rule.weights[1] - 8.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn hermite_two_point_rule() {
        let rule = gauss_hermite_prob(2);
        assert!((rule.nodes[0] + 1.0).abs() < 1e-12);
        assert!((rule.nodes[1] - 1.0).abs() < 1e-12);
        assert!((rule.weights[0] - 0.5).abs() < 1e-12);
        assert!((rule.weights[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rules_integrate_polynomials_exactly() {
        // ∫ t^4 dt over [-1, 1] = 2/5; E[X^4] = 3 for X ~ N(0, 1).
        let rule = gauss_legendre(3);
        let v: f64 = rule.nodes.iter().zip(&rule.weights).map(|(t, w)| w * t.powi(4)).sum();
        assert!((v - 0.4).abs() < 1e-12);

        let rule = gauss_hermite_prob(3);
        let v: f64 = rule.nodes.iter().zip(&rule.weights).map(|(x, w)| w * x.powi(4)).sum();
        assert!((v - 3.0).abs() < 1e-11);
    }

    #[test]
    fn product_of_linear_legendre_expansions() {
        // t * t = t^2 = (1/3) P_0 + (2/3) P_2
        let c = project_product(BasisKind::Legendre, &[0.0, 1.0], &[0.0, 1.0]);
        assert_eq!(c.len(), 3);
        assert!((c[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!(c[1].abs() < 1e-12);
        assert!((c[2] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn product_of_hermite_expansions() {
        // (1 + x)(x) = x + x^2 = He_0 + He_1 + He_2
        let c = project_product(BasisKind::Hermite, &[1.0, 1.0], &[0.0, 1.0]);
        for v in c {
            assert!((v - 1.0).abs() < 1e-11);
        }
    }
}
