//! CSV ingest and validation.
//!
//! Turns a numeric CSV with a header into a `Dataset`:
//! - the target column (`y` by default, else the last column) is the label
//! - every other column is a feature, in file order
//!
//! Design goals:
//! - **Strict schema** (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (rows keep their file order)

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Dataset;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Per-column ranges of the rows actually used.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_points: usize,
    pub x_min: Vec<f64>,
    pub x_max: Vec<f64>,
    pub y_min: f64,
    pub y_max: f64,
}

/// Ingest output: dataset + column names + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub dataset: Dataset,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Feature rows for evaluation; the target is kept when the file has one.
#[derive(Debug, Clone)]
pub struct EvalPoints {
    pub dim: usize,
    pub x: Vec<f64>,
    pub y: Option<Vec<f64>>,
    pub row_errors: Vec<RowError>,
}

impl EvalPoints {
    pub fn len(&self) -> usize {
        self.x.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Load a training CSV. `target` names the label column; without it the
/// column `y` is used when present, else the last column.
pub fn load_dataset(path: &Path, target: Option<&str>) -> Result<IngestedData, AppError> {
    let (headers, records) = read_table(path)?;
    if headers.len() < 2 {
        return Err(AppError::input(format!(
            "CSV '{}' needs at least one feature column and a target column.",
            path.display()
        )));
    }
    let target_idx = resolve_target(&headers, target)?;
    let feature_idx: Vec<usize> = (0..headers.len()).filter(|&i| i != target_idx).collect();
    let dim = feature_idx.len();

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut row_errors = Vec::new();
    let rows_read = records.len();

    for (line, record) in records {
        let record = match record {
            Ok(r) => r,
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        };
        let parsed = parse_values(&record, &headers, &feature_idx)
            .and_then(|xs| parse_cell(&record, &headers, target_idx).map(|yv| (xs, yv)));
        match parsed {
            Ok((xs, yv)) => {
                x.extend(xs);
                y.push(yv);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let rows_used = y.len();
    if rows_used == 0 {
        return Err(AppError::data(format!(
            "No valid rows remain in '{}' after validation.",
            path.display()
        )));
    }

    let stats = compute_stats(dim, &x, &y);
    let dataset = Dataset::new(dim, x, y)?;

    Ok(IngestedData {
        dataset,
        feature_names: feature_idx.iter().map(|&i| headers[i].clone()).collect(),
        target_name: headers[target_idx].clone(),
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Load evaluation points for a `dim`-dimensional model. A file with
/// `dim + 1` columns carries a target (resolved like `load_dataset`).
pub fn load_points(path: &Path, dim: usize, target: Option<&str>) -> Result<EvalPoints, AppError> {
    let (headers, records) = read_table(path)?;
    let target_idx = if headers.len() == dim + 1 {
        Some(resolve_target(&headers, target)?)
    } else if headers.len() == dim {
        None
    } else {
        return Err(AppError::input(format!(
            "CSV '{}' has {} columns; a {dim}-dimensional model needs {dim} (or {} with a target).",
            path.display(),
            headers.len(),
            dim + 1
        )));
    };
    let feature_idx: Vec<usize> = (0..headers.len()).filter(|&i| Some(i) != target_idx).collect();

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut row_errors = Vec::new();
    for (line, record) in records {
        let record = match record {
            Ok(r) => r,
            Err(message) => {
                row_errors.push(RowError { line, message });
                continue;
            }
        };
        let parsed = parse_values(&record, &headers, &feature_idx).and_then(|xs| match target_idx {
            Some(t) => parse_cell(&record, &headers, t).map(|yv| (xs, Some(yv))),
            None => Ok((xs, None)),
        });
        match parsed {
            Ok((xs, yv)) => {
                x.extend(xs);
                if let Some(v) = yv {
                    y.push(v);
                }
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if x.is_empty() {
        return Err(AppError::data(format!("No valid rows in '{}'.", path.display())));
    }

    Ok(EvalPoints {
        dim,
        x,
        y: target_idx.map(|_| y),
        row_errors,
    })
}

/// Parse a comma-separated point such as `"0.1, -0.3, 2"`.
pub fn parse_point(s: &str) -> Result<Vec<f64>, AppError> {
    s.split(',')
        .map(|v| {
            let v = v.trim();
            v.parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .ok_or_else(|| AppError::input(format!("Invalid coordinate '{v}' in point '{s}'.")))
        })
        .collect()
}

type Records = Vec<(usize, Result<StringRecord, String>)>;

fn read_table(path: &Path) -> Result<(Vec<String>, Records), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();

    // +2: records() starts after the header, lines are 1-based.
    let records = reader
        .records()
        .enumerate()
        .map(|(idx, r)| (idx + 2, r.map_err(|e| format!("CSV parse error: {e}"))))
        .collect();

    Ok((headers, records))
}

fn normalize_header_name(name: &str) -> String {
    // Excel emits a BOM before the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_target(headers: &[String], target: Option<&str>) -> Result<usize, AppError> {
    match target {
        Some(name) => {
            let name = normalize_header_name(name);
            headers
                .iter()
                .position(|h| *h == name)
                .ok_or_else(|| AppError::input(format!("Missing target column: `{name}`")))
        }
        None => Ok(headers.iter().position(|h| h == "y").unwrap_or(headers.len() - 1)),
    }
}

fn parse_values(record: &StringRecord, headers: &[String], idx: &[usize]) -> Result<Vec<f64>, String> {
    idx.iter().map(|&i| parse_cell(record, headers, i)).collect()
}

fn parse_cell(record: &StringRecord, headers: &[String], i: usize) -> Result<f64, String> {
    let raw = record
        .get(i)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing value for `{}`.", headers[i]))?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid `{}` value '{raw}'.", headers[i])),
    }
}

fn compute_stats(dim: usize, x: &[f64], y: &[f64]) -> DatasetStats {
    let mut x_min = vec![f64::INFINITY; dim];
    let mut x_max = vec![f64::NEG_INFINITY; dim];
    for row in x.chunks(dim) {
        for (j, &v) in row.iter().enumerate() {
            x_min[j] = x_min[j].min(v);
            x_max[j] = x_max[j].max(v);
        }
    }
    DatasetStats {
        n_points: y.len(),
        x_min,
        x_max,
        y_min: y.iter().copied().fold(f64::INFINITY, f64::min),
        y_max: y.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ftr_ingest_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data.csv");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn ingest_uses_y_column_and_skips_bad_rows() {
        let path = write_temp(
            "ycol",
            "\u{feff}X0,y,x1\n0.5,1.0,0.25\n0.1,,0.3\nfoo,2.0,1.0\n-0.5,3.0,-1.0\n",
        );
        let out = load_dataset(&path, None).unwrap();
        assert_eq!(out.target_name, "y");
        assert_eq!(out.feature_names, vec!["x0", "x1"]);
        assert_eq!(out.rows_read, 4);
        assert_eq!(out.rows_used, 2);
        assert_eq!(out.row_errors.len(), 2);
        assert_eq!(out.row_errors[0].line, 3);
        assert_eq!(out.dataset.row(1), &[-0.5, -1.0]);
        assert_eq!(out.dataset.y(), &[1.0, 3.0]);
        assert_eq!(out.stats.x_min, vec![-0.5, -1.0]);
        assert_eq!(out.stats.y_max, 3.0);
    }

    #[test]
    fn ingest_defaults_to_last_column() {
        let path = write_temp("last", "a,b,out\n1,2,3\n4,5,6\n");
        let out = load_dataset(&path, None).unwrap();
        assert_eq!(out.target_name, "out");
        assert_eq!(out.dataset.dim(), 2);

        let err = load_dataset(&path, Some("missing")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn ingest_with_no_valid_rows_is_a_data_error() {
        let path = write_temp("empty", "x,y\nfoo,bar\n");
        assert_eq!(load_dataset(&path, None).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn eval_points_detect_optional_target() {
        let path = write_temp("eval", "x0,x1,y\n1,2,3\n");
        let with_y = load_points(&path, 2, None).unwrap();
        assert_eq!(with_y.y, Some(vec![3.0]));
        let features = load_points(&path, 3, None).unwrap();
        assert!(features.y.is_none());
        assert_eq!(features.len(), 1);
        assert!(load_points(&path, 5, None).is_err());
    }

    #[test]
    fn points_parse_from_text() {
        assert_eq!(parse_point("0.5, -1,2e-1").unwrap(), vec![0.5, -1.0, 0.2]);
        assert!(parse_point("1,,2").is_err());
        assert!(parse_point("1,nan").is_err());
    }
}
