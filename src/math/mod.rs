//! Numerical building blocks: polynomial bases, quadrature, least squares and
//! the L-BFGS optimizer.

pub mod basis;
pub mod lbfgs;
pub mod ols;
pub mod quadrature;

pub use basis::*;
pub use lbfgs::*;
pub use ols::*;
pub use quadrature::*;
