//! Read/write model JSON files.
//!
//! A model file is the portable representation of a surrogate:
//! - tool name + creation time
//! - the fit summary (absent for combined or rounded models)
//! - the full function train (per-dimension options + cores)

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::FitSummary;
use crate::error::AppError;
use crate::models::FunctionTrain;
use crate::surrogate::FtModel;

pub const TOOL_NAME: &str = "ftr";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    /// Free-form provenance, e.g. `"fit data.csv"` or `"add a.json b.json"`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub summary: Option<FitSummary>,
    pub ft: FunctionTrain,
}

impl ModelFile {
    pub fn from_model(model: &FtModel, source: Option<String>) -> Result<Self, AppError> {
        Ok(Self {
            tool: TOOL_NAME.to_string(),
            created_at: Utc::now(),
            source,
            summary: model.summary().cloned(),
            ft: model.ft()?.clone(),
        })
    }

    pub fn into_model(self) -> FtModel {
        FtModel::from_ft(self.ft, self.summary)
    }
}

/// Write a model JSON file.
pub fn write_model_json(path: &Path, model: &ModelFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create model JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, model)
        .map_err(|e| AppError::input(format!("Failed to write model JSON: {e}")))?;
    Ok(())
}

/// Read a model JSON file. The function train is re-validated on load.
pub fn read_model_json(path: &Path) -> Result<ModelFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open model JSON '{}': {e}", path.display())))?;
    let raw: ModelFile = serde_json::from_reader(file)
        .map_err(|e| AppError::input(format!("Invalid model JSON '{}': {e}", path.display())))?;
    let ModelFile {
        tool,
        created_at,
        source,
        summary,
        ft,
    } = raw;
    let dims = ft.dims().to_vec();
    let cores = ft.cores().to_vec();
    let ft = FunctionTrain::from_cores(dims, cores)
        .map_err(|e| AppError::input(format!("Invalid model in '{}': {}", path.display(), e.message())))?;
    Ok(ModelFile {
        tool,
        created_at,
        source,
        summary,
        ft,
    })
}
