//! Terminal styling utilities for console output

use console::{style, Emoji};
use std::path::Path;
use std::time::Duration;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static DICE: Emoji<'_, '_> = Emoji("🎲 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
     ___  _____  _  _____  _      _    ___
    / __||_   _|/_\|_   _|| |    /_\  | _ )
    \__ \  | | / _ \ | |  | |__ / _ \ | _ \
    |___/  |_|/_/ \_\|_|  |____/_/ \_\|___/
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {} {}",
        style("β̂").magenta().bold(),
        style("Likelihoods, samplers and experiments from the command line").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print a configuration card of label/value rows
pub fn print_config(title: &str, rows: &[(&str, String)]) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);
    let label_width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let value_width = box_width.saturating_sub(label_width + 7);

    println!("    ┌{}┐", line);
    println!(
        "    │ {:<w$}│",
        style(format!("⚙️  {}", title)).cyan().bold(),
        w = box_width - 3
    );
    println!("    ├{}┤", line);
    for (label, value) in rows {
        println!(
            "    │  {:<lw$}  {:<vw$}│",
            label,
            style(truncate_string(value, value_width)).yellow(),
            lw = label_width,
            vw = value_width
        );
    }
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("    {} {}", WARN, style(message).yellow());
}

/// Print a path the results were written to
pub fn print_saved(path: &Path) {
    println!(
        "    {} {}",
        SAVE,
        style(truncate_path(path, 60)).underlined()
    );
}

/// Print how long a step took
pub fn print_step_time(elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let text = if secs < 1.0 {
        format!("{:.0} ms", secs * 1000.0)
    } else {
        format!("{:.2} s", secs)
    };
    println!("    {}", style(format!("⏱  {}", text)).dim());
}

/// Print the final completion message
pub fn print_completion(analysis: &str) {
    println!();
    println!(
        "    {} {}",
        ROCKET,
        style(format!("{} complete!", analysis)).green().bold()
    );
    println!();
}

/// Print a styled key figure, e.g. "Loaded 1000 rows"
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    if let Some(info) = detail {
        println!(
            "      {} {} {}",
            style(count).yellow().bold(),
            description,
            style(info).dim()
        );
    } else {
        println!("      {} {}", style(count).yellow().bold(), description);
    }
}

// Helper functions

pub fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    truncate_string(&path_str, max_len)
}

pub fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len || max_len < 4 {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
