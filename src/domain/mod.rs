//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - per-dimension basis configuration (`DimOpts`)
//! - regression datasets (`Dataset`)
//! - algorithm/objective selectors (`RegressAlg`, `RegressObj`)
//! - fit outputs (`FitSummary`, `AdaptStep`)

pub mod types;

pub use types::*;
