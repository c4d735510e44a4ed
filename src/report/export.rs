//! JSON, CSV and zip exports of analysis results

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use polars::prelude::*;
use serde::Serialize;
use ::zip::write::SimpleFileOptions;
use ::zip::ZipWriter;

use crate::pipeline::{Chain, StepOutcome};

/// Metadata about the analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// Timestamp of the analysis (ISO 8601 format)
    pub timestamp: String,
    /// statlab version
    pub statlab_version: String,
    /// Input file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,
    /// Subcommand that produced the results
    pub analysis: String,
    /// RNG seed
    pub seed: u64,
}

impl AnalysisMetadata {
    pub fn new(analysis: &str, input_file: Option<&Path>, seed: u64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            statlab_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: input_file.map(|p| p.display().to_string()),
            analysis: analysis.to_string(),
            seed,
        }
    }
}

#[derive(Serialize)]
struct AnalysisExport<'a, T: Serialize> {
    metadata: &'a AnalysisMetadata,
    results: &'a T,
}

/// Write `results` wrapped with run metadata as pretty JSON.
pub fn export_json<T: Serialize>(
    metadata: &AnalysisMetadata,
    results: &T,
    output_path: &Path,
) -> Result<()> {
    let export = AnalysisExport { metadata, results };
    let json = serde_json::to_string_pretty(&export)
        .with_context(|| format!("Failed to serialize {} results to JSON", metadata.analysis))?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write results to {}", output_path.display()))?;
    Ok(())
}

/// Write a DataFrame as CSV.
pub fn write_csv(df: &mut DataFrame, output_path: &Path) -> Result<()> {
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    CsvWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("Failed to write CSV file: {}", output_path.display()))?;
    Ok(())
}

/// Write equally long named series as CSV columns (plot data).
pub fn export_series(output_path: &Path, series: Vec<(String, Vec<f64>)>) -> Result<()> {
    let columns: Vec<Column> = series
        .into_iter()
        .map(|(name, values)| Column::new(name.into(), values))
        .collect();
    let mut df = DataFrame::new(columns).context("Plot series must have equal lengths")?;
    write_csv(&mut df, output_path)
}

/// Write every recorded state of a chain: `step`, `accepted`, one column per
/// parameter. Burn-in steps are included and flagged.
pub fn export_chain(output_path: &Path, names: &[String], chain: &Chain) -> Result<()> {
    let steps = chain.draws.len();
    let mut columns = vec![
        Column::new("step".into(), (1..=steps as u64).collect::<Vec<_>>()),
        Column::new(
            "burn_in".into(),
            (0..steps).map(|i| i < chain.burn_in).collect::<Vec<_>>(),
        ),
        Column::new(
            "accepted".into(),
            chain
                .outcomes
                .iter()
                .map(|o| *o == StepOutcome::Accepted)
                .collect::<Vec<_>>(),
        ),
    ];
    for (j, name) in names.iter().enumerate() {
        columns.push(Column::new(name.as_str().into(), chain.trace(j)));
    }

    let mut df = DataFrame::new(columns)?;
    write_csv(&mut df, output_path)
}

/// Bundle `files` into a deflated zip archive and remove the originals.
pub fn package_reports(files: &[PathBuf], zip_path: &Path) -> Result<()> {
    let zip_file = File::create(zip_path)
        .with_context(|| format!("Failed to create zip file: {}", zip_path.display()))?;

    let mut zip = ZipWriter::new(zip_file);
    let options = SimpleFileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?;
        zip.start_file(filename, options)
            .with_context(|| format!("Failed to add {} to zip", filename))?;
        let mut content = Vec::new();
        File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?
            .read_to_end(&mut content)?;
        zip.write_all(&content)?;
    }

    zip.finish().context("Failed to finalize zip file")?;

    for path in files {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove {} after zipping: {}", path.display(), e);
        }
    }

    Ok(())
}
