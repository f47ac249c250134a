//! `ft-regress` library crate.
//!
//! Low-rank function-train surrogates of multivariate functions: fit them to
//! data, evaluate, integrate, add, multiply and round them.
//!
//! The binary (`ftr`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the surrogate API (`surrogate::FtModel`) is usable from other programs
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod surrogate;
