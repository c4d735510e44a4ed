//! Dataset loader for CSV, Parquet and Stata files

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use super::dta::{load_dta, read_dta_header};
use crate::utils::create_spinner;

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Load a dataset into memory, dispatching on the file extension.
///
/// `infer_schema_length` applies to CSV only; `0` scans every row.
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<DataFrame> {
    let extension = extension_of(path);

    let df = match extension.as_str() {
        "csv" => {
            let infer = if infer_schema_length == 0 {
                None
            } else {
                Some(infer_schema_length)
            };
            LazyCsvReader::new(path)
                .with_infer_schema_length(infer)
                .finish()
                .and_then(|lf| lf.collect())
                .with_context(|| format!("Failed to load CSV file: {}", path.display()))?
        }
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .and_then(|lf| lf.collect())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        "dta" => load_dta(path)
            .with_context(|| format!("Failed to load Stata file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet, dta",
            extension
        ),
    };

    Ok(df)
}

/// Load a dataset behind a spinner and report its shape.
///
/// Returns `(df, rows, columns, estimated memory in MB)`.
pub fn load_dataset_with_progress(
    path: &Path,
    infer_schema_length: usize,
) -> Result<(DataFrame, usize, usize, f64)> {
    let spinner = create_spinner(&format!("Loading {}", path.display()));
    let result = load_dataset(path, infer_schema_length);
    spinner.finish_and_clear();

    let df = result?;
    let (rows, cols) = df.shape();
    let memory_mb = df.estimated_size() as f64 / (1024.0 * 1024.0);
    log::info!(
        "Loaded {}: {} rows x {} columns ({:.2} MB)",
        path.display(),
        rows,
        cols,
        memory_mb
    );

    Ok((df, rows, cols, memory_mb))
}

/// Column names of a dataset without materialising the rows where the
/// format allows it.
pub fn get_column_names(path: &Path) -> Result<Vec<String>> {
    let names = match extension_of(path).as_str() {
        "csv" => {
            let schema = LazyCsvReader::new(path)
                .with_n_rows(Some(1))
                .finish()?
                .collect_schema()?;
            schema.iter_names().map(|s| s.to_string()).collect()
        }
        "parquet" => {
            let schema = LazyFrame::scan_parquet(path, Default::default())?.collect_schema()?;
            schema.iter_names().map(|s| s.to_string()).collect()
        }
        "dta" => read_dta_header(path)
            .with_context(|| format!("Failed to read Stata header: {}", path.display()))?
            .variables
            .into_iter()
            .map(|v| v.name)
            .collect(),
        other => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet, dta",
            other
        ),
    };
    Ok(names)
}

/// Fail with a readable message when any of `names` is absent from `df`.
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<()> {
    let available: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let missing: Vec<&str> = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| !available.iter().any(|a| a.as_str() == *n))
        .collect();

    if !missing.is_empty() {
        anyhow::bail!(
            "Column(s) not found: {}. Available columns: {}",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_columns_lists_missing() {
        let df = df! { "a" => [1i32], "b" => [2i32] }.unwrap();
        assert!(require_columns(&df, &["a", "b"]).is_ok());
        let err = require_columns(&df, &["a", "zzz"]).unwrap_err().to_string();
        assert!(err.contains("zzz"));
        assert!(err.contains("Available columns: a, b"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_dataset(Path::new("data.xlsx"), 100)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Supported formats: csv, parquet, dta"));
    }
}
