//! Export predictions to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::Path;

use crate::error::AppError;

/// Write one row per point: features, prediction and, when known, the
/// observed value and residual.
pub fn write_predictions_csv(
    path: &Path,
    feature_names: &[String],
    x: &[f64],
    predictions: &[f64],
    observed: Option<&[f64]>,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let dim = feature_names.len();

    let mut header: Vec<String> = feature_names.to_vec();
    header.push("y_fit".to_string());
    if observed.is_some() {
        header.push("y_obs".to_string());
        header.push("residual".to_string());
    }
    writer
        .write_record(&header)
        .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    for (i, (row, fit)) in x.chunks(dim).zip(predictions).enumerate() {
        let mut record: Vec<String> = row.iter().map(|v| format!("{v:.10}")).collect();
        record.push(format!("{fit:.10}"));
        if let Some(obs) = observed {
            record.push(format!("{:.10}", obs[i]));
            record.push(format!("{:.10}", obs[i] - fit));
        }
        writer
            .write_record(&record)
            .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Default column names `x0, x1, ...`.
pub fn default_feature_names(dim: usize) -> Vec<String> {
    (0..dim).map(|i| format!("x{i}")).collect()
}
