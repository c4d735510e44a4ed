//! CSV / Stata to Parquet conversion

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use polars::prelude::*;

use super::args::default_parquet_path;
use crate::pipeline::load_dta;
use crate::utils::create_spinner;

/// Convert a CSV or DTA file to Parquet.
///
/// CSV input is streamed with `sink_parquet()` so the file is never held in
/// memory as a whole. DTA input is decoded in full and written in one go.
pub fn run_convert(input: &Path, output: Option<&Path>, infer_schema_length: usize) -> Result<()> {
    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_parquet_path(input),
    };

    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    println!(
        "\n {} Converting {} to Parquet",
        style("◆").cyan().bold(),
        extension.to_uppercase()
    );
    println!("   Input:  {}", style(input.display()).dim());
    println!("   Output: {}", style(output_path.display()).dim());
    println!();

    let num_cols = match extension.as_str() {
        "csv" => convert_csv(input, &output_path, infer_schema_length)?,
        "dta" => convert_dta(input, &output_path)?,
        other => anyhow::bail!(
            "Cannot convert '.{}' files. Supported formats: csv, dta",
            other
        ),
    };

    let input_size = file_size_mb(input);
    let output_size = file_size_mb(&output_path);
    let row_count = get_parquet_row_count(&output_path).unwrap_or(0);

    println!();
    println!(
        "   {} rows × {} columns",
        style(row_count).yellow(),
        style(num_cols).yellow()
    );
    println!("   {} File sizes:", style("✧").cyan());
    println!("      {:<8} {:.2} MB", format!("{}:", extension.to_uppercase()), input_size);
    println!("      Parquet: {:.2} MB", output_size);

    if output_size < input_size {
        let reduction = ((input_size - output_size) / input_size) * 100.0;
        println!(
            "      {}",
            style(format!("↓ {:.1}% smaller", reduction)).green()
        );
    }

    println!();
    println!(" {} Conversion complete!", style("✓").green().bold());

    Ok(())
}

fn parquet_options() -> ParquetWriteOptions {
    ParquetWriteOptions {
        compression: ParquetCompression::Snappy,
        statistics: StatisticsOptions::full(),
        row_group_size: Some(100_000),
        ..Default::default()
    }
}

/// Stream a CSV file into Parquet. Returns the column count.
fn convert_csv(input: &Path, output_path: &Path, infer_schema_length: usize) -> Result<usize> {
    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let spinner = create_spinner("Reading CSV schema...");
    let lf = LazyCsvReader::new(input)
        .with_infer_schema_length(schema_length)
        .with_rechunk(false)
        .finish()
        .with_context(|| format!("Failed to read CSV file: {}", input.display()))?;

    let num_cols = lf.clone().collect_schema()?.len();
    spinner.finish_with_message(format!(
        "{} Schema loaded ({} columns)",
        style("✓").green(),
        num_cols
    ));

    let spinner = create_spinner("Streaming to Parquet...");
    lf.sink_parquet(&output_path, parquet_options(), None)
        .with_context(|| format!("Failed to write Parquet file: {}", output_path.display()))?;
    spinner.finish_with_message(format!("{} Parquet written", style("✓").green()));

    Ok(num_cols)
}

/// Decode a Stata file and write it as Parquet. Returns the column count.
fn convert_dta(input: &Path, output_path: &Path) -> Result<usize> {
    let spinner = create_spinner("Decoding Stata file...");
    let mut df = load_dta(input)
        .with_context(|| format!("Failed to read Stata file: {}", input.display()))?;
    spinner.finish_with_message(format!(
        "{} Decoded {} variables",
        style("✓").green(),
        df.width()
    ));

    let spinner = create_spinner("Writing Parquet...");
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .with_statistics(StatisticsOptions::full())
        .with_row_group_size(Some(100_000))
        .finish(&mut df)
        .with_context(|| format!("Failed to write Parquet file: {}", output_path.display()))?;
    spinner.finish_with_message(format!("{} Parquet written", style("✓").green()));

    Ok(df.width())
}

fn file_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) as f64 / (1024.0 * 1024.0)
}

/// Row count from Parquet metadata
fn get_parquet_row_count(path: &Path) -> Result<usize> {
    let lf = LazyFrame::scan_parquet(path, Default::default())?;
    let df = lf.select([len()]).collect()?;
    let count = df.column("len")?.get(0)?;
    match count {
        AnyValue::UInt32(n) => Ok(n as usize),
        AnyValue::UInt64(n) => Ok(n as usize),
        AnyValue::Int32(n) => Ok(n as usize),
        AnyValue::Int64(n) => Ok(n as usize),
        _ => Ok(0),
    }
}
