//! Terminal plots: horizontal histograms and line sparklines

use console::style;

use crate::pipeline::stats::{histogram, HistogramBin};

const BAR_WIDTH: usize = 40;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render bins as rows of `█` scaled to the fullest bin.
pub fn render_histogram(bins: &[HistogramBin]) -> Vec<String> {
    let max = bins.iter().map(|b| b.count).max().unwrap_or(0);
    bins.iter()
        .map(|bin| {
            let width = if max > 0 {
                (bin.count as f64 / max as f64 * BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            format!(
                "{:>10.4} │{:<w$} {}",
                bin.lower,
                "█".repeat(width),
                bin.count,
                w = BAR_WIDTH
            )
        })
        .collect()
}

/// Print a histogram of `values` with a title.
pub fn print_histogram(title: &str, values: &[f64], bins: usize) {
    println!();
    println!("    {}", style(title).white().bold());
    for line in render_histogram(&histogram(values, bins)) {
        println!("    {}", style(line).cyan());
    }
}

/// Compress `values` into at most `width` block characters.
///
/// Each character shows the mean of the values it covers; the vertical level
/// is scaled between the series minimum and maximum.
pub fn sparkline(values: &[f64], width: usize) -> String {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || width == 0 {
        return String::new();
    }

    let chunk = finite.len().div_ceil(width);
    let points: Vec<f64> = finite
        .chunks(chunk)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect();

    let min = points.iter().copied().fold(f64::INFINITY, f64::min);
    let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    points
        .iter()
        .map(|v| {
            let level = if span > 0.0 {
                ((v - min) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize
            } else {
                0
            };
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

/// Print a labelled sparkline with its range.
pub fn print_sparkline(label: &str, values: &[f64]) {
    let line = sparkline(values, 60);
    if line.is_empty() {
        return;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    println!(
        "      {:<18} {} {}",
        label,
        style(line).cyan(),
        style(format!("[{:.4}, {:.4}]", min, max)).dim()
    );
}
