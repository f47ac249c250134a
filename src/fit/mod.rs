//! Regression of function trains on data.
//!
//! Responsibilities:
//!
//! - parameterize a function train and initialize it from linear least squares
//! - evaluate the least-squares objective and its gradient (parallel)
//! - run fixed-rank fits (AIO / ALS)
//! - adapt ranks and select settings by cross-validation

pub mod adapt;
pub mod cross_validate;
pub mod objective;
pub mod param;
pub mod regress;

pub use cross_validate::{CrossValidate, CvCase, CvGridResult, CvParam, grid_search};
pub use objective::{Objective, training_error};
pub use param::FtParam;
pub use regress::{AdaptOpts, FtRegress, RegressOpts, RunReport};
