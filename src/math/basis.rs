//! Orthogonal polynomial families used as univariate bases.
//!
//! Two families are supported:
//!
//! - Legendre polynomials `P_l(t)` on the reference interval `[-1, 1]`,
//!   orthogonal under the Lebesgue measure: `∫ P_m P_l dt = 2 / (2l + 1) δ_ml`.
//! - Probabilists' Hermite polynomials `He_l(x)` on the real line, orthogonal
//!   under the standard normal measure: `E[He_m He_l] = l! δ_ml`.
//!
//! Both are evaluated with their three-term recurrences, which are stable for
//! the modest degrees used in regression.

use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Polynomial family of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BasisKind {
    /// Legendre polynomials on a bounded interval `[lb, ub]`.
    Legendre,
    /// Probabilists' Hermite polynomials on the real line.
    Hermite,
}

impl BasisKind {
    pub fn name(self) -> &'static str {
        match self {
            BasisKind::Legendre => "legendre",
            BasisKind::Hermite => "hermite",
        }
    }

    /// Fill `out[l]` with basis `l` at reference coordinate `t`.
    pub fn eval(self, t: f64, out: &mut [f64]) {
        match self {
            BasisKind::Legendre => legendre(t, out),
            BasisKind::Hermite => hermite(t, out),
        }
    }

    /// Squared norm of basis `l` under the reference measure.
    pub fn ref_sq_norm(self, l: usize) -> f64 {
        match self {
            BasisKind::Legendre => legendre_sq_norm(l),
            BasisKind::Hermite => hermite_sq_norm(l),
        }
    }
}

impl FromStr for BasisKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legendre" => Ok(BasisKind::Legendre),
            "hermite" => Ok(BasisKind::Hermite),
            other => Err(AppError::input(format!(
                "Unknown basis family '{other}' (expected 'legendre' or 'hermite')."
            ))),
        }
    }
}

/// Fill `out[l] = P_l(t)` for `l = 0..out.len()`.
pub fn legendre(t: f64, out: &mut [f64]) {
    let n = out.len();
    if n == 0 {
        return;
    }
    out[0] = 1.0;
    if n == 1 {
        return;
    }
    out[1] = t;
    for k in 1..n - 1 {
        let kf = k as f64;
        out[k + 1] = ((2.0 * kf + 1.0) * t * out[k] - kf * out[k - 1]) / (kf + 1.0);
    }
}

/// Fill `out[l] = He_l(x)` for `l = 0..out.len()`.
pub fn hermite(x: f64, out: &mut [f64]) {
    let n = out.len();
    if n == 0 {
        return;
    }
    out[0] = 1.0;
    if n == 1 {
        return;
    }
    out[1] = x;
    for k in 1..n - 1 {
        out[k + 1] = x * out[k] - (k as f64) * out[k - 1];
    }
}

/// `∫_{-1}^{1} P_l(t)^2 dt`.
pub fn legendre_sq_norm(l: usize) -> f64 {
    2.0 / (2.0 * l as f64 + 1.0)
}

/// `E[He_l(X)^2] = l!` for `X ~ N(0, 1)`.
pub fn hermite_sq_norm(l: usize) -> f64 {
    (1..=l).fold(1.0, |acc, k| acc * k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legendre_matches_closed_forms() {
        let t = 0.3;
        let mut p = [0.0; 4];
        legendre(t, &mut p);
        assert!((p[0] - 1.0).abs() < 1e-15);
        assert!((p[1] - t).abs() < 1e-15);
        assert!((p[2] - 0.5 * (3.0 * t * t - 1.0)).abs() < 1e-14);
        assert!((p[3] - 0.5 * (5.0 * t * t * t - 3.0 * t)).abs() < 1e-14);
    }

    #[test]
    fn hermite_matches_closed_forms() {
        let x = -1.7;
        let mut h = [0.0; 4];
        hermite(x, &mut h);
        assert!((h[2] - (x * x - 1.0)).abs() < 1e-14);
        assert!((h[3] - (x * x * x - 3.0 * x)).abs() < 1e-13);
    }

    #[test]
    fn family_names_parse_case_insensitively() {
        assert_eq!("Legendre".parse::<BasisKind>().unwrap(), BasisKind::Legendre);
        assert_eq!(" HERMITE ".parse::<BasisKind>().unwrap(), BasisKind::Hermite);
        let err = "chebyshev".parse::<BasisKind>().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn norms_are_positive() {
        assert!((legendre_sq_norm(0) - 2.0).abs() < 1e-15);
        assert!((legendre_sq_norm(2) - 0.4).abs() < 1e-15);
        assert!((hermite_sq_norm(4) - 24.0).abs() < 1e-12);
    }
}
