//! Function-train representation and its algebra.
//!
//! - `core`: one `r_left x r_right` matrix of univariate expansions
//! - `train`: construction, evaluation, integration, inner products
//! - `algebra`: sums and products
//! - `round`: rank compression

pub mod algebra;
pub mod core;
pub mod round;
pub mod train;

pub use algebra::{difference, product, sum};
pub use self::core::Core;
pub use round::round;
pub use train::FunctionTrain;
