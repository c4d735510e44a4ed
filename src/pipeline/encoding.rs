//! Feature encoding: numeric extraction, indicator (dummy) variables and
//! design matrix assembly.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use faer::Mat;
use polars::prelude::*;

use super::error::ModelError;

/// Extract a column as `f64` values.
///
/// Integer and boolean columns are cast to Float64. Null values are an error:
/// every estimator in this crate needs complete cases.
pub fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| anyhow::anyhow!("Column '{}' not found in DataFrame", name))?;

    let float_col = column.cast(&DataType::Float64).map_err(|_| {
        anyhow::anyhow!(
            "Column '{}' must be numeric (cannot cast to Float64)",
            name
        )
    })?;

    let ca = float_col
        .f64()
        .with_context(|| format!("Failed to access column '{}' as Float64", name))?;

    let null_count = ca.null_count();
    if null_count > 0 {
        anyhow::bail!(
            "Column '{}' contains {} null value(s); drop or impute them before fitting",
            name,
            null_count
        );
    }

    Ok(ca.iter().flatten().collect())
}

/// Extract a column as strings, used for categorical levels and ids.
///
/// Floats are rendered with `{}` so that `1.0` becomes `"1"`.
pub fn column_as_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df
        .column(name)
        .map_err(|_| anyhow::anyhow!("Column '{}' not found in DataFrame", name))?;

    let values: Vec<Option<String>> = match col.dtype() {
        DataType::String => col
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = col.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let cast = col.cast(&DataType::UInt64)?;
            cast.u64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::Float32 | DataType::Float64 => {
            let cast = col.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(|n| format!("{}", n)))
                .collect()
        }
        DataType::Boolean => col
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| b.to_string()))
            .collect(),
        _ => {
            let cast = col
                .cast(&DataType::String)
                .with_context(|| format!("Failed to cast column '{}' to String", name))?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}

/// Sorted distinct non-null values of a column, rendered as strings.
pub fn column_levels(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let levels: BTreeSet<String> = column_as_strings(df, name)?.into_iter().flatten().collect();
    Ok(levels.into_iter().collect())
}

/// One-hot encode a categorical column, dropping the baseline level.
///
/// Returns one `({column}_{level}, indicator)` pair per non-baseline level in
/// sorted level order. The baseline defaults to the first sorted level.
pub fn one_hot_encode(
    df: &DataFrame,
    name: &str,
    baseline: Option<&str>,
) -> Result<Vec<(String, Vec<f64>)>> {
    let values = column_as_strings(df, name)?;
    if let Some(row) = values.iter().position(|v| v.is_none()) {
        anyhow::bail!("Categorical column '{}' has a null value at row {}", name, row);
    }

    let levels = column_levels(df, name)?;
    let baseline = match baseline {
        Some(b) => {
            if !levels.iter().any(|l| l == b) {
                anyhow::bail!(
                    "Baseline level '{}' not found in column '{}'. Available levels: {:?}",
                    b,
                    name,
                    levels
                );
            }
            b.to_string()
        }
        None => levels
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Categorical column '{}' has no levels", name))?,
    };

    let encoded = levels
        .iter()
        .filter(|level| **level != baseline)
        .map(|level| {
            let indicator = values
                .iter()
                .map(|v| if v.as_deref() == Some(level.as_str()) { 1.0 } else { 0.0 })
                .collect();
            (format!("{}_{}", name, level), indicator)
        })
        .collect();

    Ok(encoded)
}

/// Which columns enter a design matrix and how.
#[derive(Debug, Clone, Default)]
pub struct DesignSpec {
    /// Columns used as-is
    pub numeric: Vec<String>,
    /// Columns expanded into indicators
    pub categorical: Vec<String>,
    /// Numeric columns that also get a squared term (`{col}_sq`)
    pub squared: Vec<String>,
    /// Baseline level per categorical column
    pub baselines: HashMap<String, String>,
    /// Prepend a column of ones named `intercept`
    pub intercept: bool,
}

impl DesignSpec {
    pub fn with_intercept() -> Self {
        Self {
            intercept: true,
            ..Default::default()
        }
    }
}

/// A dense design matrix with named columns (rows are observations).
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub names: Vec<String>,
    pub data: Mat<f64>,
}

impl DesignMatrix {
    /// Build from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (name, values) in &columns {
            if values.len() != n {
                return Err(ModelError::DimensionMismatch {
                    what: format!("length of column '{}'", name),
                    expected: n,
                    actual: values.len(),
                }
                .into());
            }
        }

        let data = Mat::from_fn(n, columns.len(), |i, j| columns[j].1[i]);
        let names = columns.into_iter().map(|(name, _)| name).collect();
        Ok(Self { names, data })
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.data[(i, j)]).collect()
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.data[(i, j)]).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// `x_i . beta` for row `i`.
    #[inline]
    pub fn row_dot(&self, i: usize, beta: &[f64]) -> f64 {
        beta.iter()
            .enumerate()
            .map(|(j, b)| self.data[(i, j)] * b)
            .sum()
    }

    /// `X beta` for every row.
    pub fn linear_predictor(&self, beta: &[f64]) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.row_dot(i, beta)).collect()
    }

    /// A copy with every entry of column `index` replaced by `value`.
    pub fn with_column_set(&self, index: usize, value: f64) -> Self {
        let mut copy = self.clone();
        for i in 0..copy.nrows() {
            copy.data[(i, index)] = value;
        }
        copy
    }
}

/// Assemble a design matrix from a DataFrame.
///
/// Column order: intercept, numeric, squared terms, categorical indicators.
pub fn build_design_matrix(df: &DataFrame, spec: &DesignSpec) -> Result<DesignMatrix> {
    let n = df.height();
    if n == 0 {
        anyhow::bail!("Cannot build a design matrix from an empty dataset");
    }

    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

    if spec.intercept {
        columns.push(("intercept".to_string(), vec![1.0; n]));
    }

    for name in &spec.numeric {
        columns.push((name.clone(), column_as_f64(df, name)?));
    }

    for name in &spec.squared {
        let values = column_as_f64(df, name)?;
        columns.push((
            format!("{}_sq", name),
            values.iter().map(|v| v * v).collect(),
        ));
    }

    for name in &spec.categorical {
        let baseline = spec.baselines.get(name).map(|s| s.as_str());
        columns.extend(one_hot_encode(df, name, baseline)?);
    }

    if columns.is_empty() {
        anyhow::bail!("Design selects no columns");
    }

    DesignMatrix::from_columns(columns)
}

/// Parse `column=level` baseline assignments.
pub fn parse_baselines(entries: &[String]) -> Result<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            let (col, level) = entry.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Baseline '{}' must have the form column=level", entry)
            })?;
            Ok((col.trim().to_string(), level.trim().to_string()))
        })
        .collect()
}
