//! Subcommand runners
//!
//! Each runner loads its inputs, calls into `pipeline`, prints the result
//! tables and hands anything worth keeping to the [`RunContext`] for export.

mod cluster;
mod experiment;
mod mnl;
mod poisson;
mod simulate;

pub use cluster::{run_kmeans, run_knn};
pub use experiment::run_experiment;
pub use mnl::{run_mnl, run_simulate_conjoint};
pub use poisson::run_poisson;
pub use simulate::run_simulate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::args::{Cli, SamplerArgs};
use super::prompts::confirm_overwrite;
use crate::pipeline::{
    load_dataset_with_progress, metropolis_hastings, Chain, LogDensity, MetropolisConfig,
    PosteriorSummary,
};
use crate::report::{
    display_posterior_table, export_chain, export_json, export_series, package_reports,
    print_histogram, print_sparkline, AnalysisMetadata,
};
use crate::utils::{
    finish_with_success, print_saved, print_success, print_warning, sampler_progress,
};

/// Settings shared by every runner plus the list of files it exported
pub struct RunContext {
    pub seed: u64,
    pub quiet: bool,
    export_dir: Option<PathBuf>,
    bundle: bool,
    no_confirm: bool,
    overwrite_confirmed: bool,
    metadata: AnalysisMetadata,
    written: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(cli: &Cli, analysis: &str, input: Option<&Path>) -> Self {
        Self {
            seed: cli.seed,
            quiet: cli.quiet,
            export_dir: cli.export_dir.clone(),
            bundle: cli.bundle,
            no_confirm: cli.no_confirm,
            overwrite_confirmed: false,
            metadata: AnalysisMetadata::new(analysis, input, cli.seed),
            written: Vec::new(),
        }
    }

    /// A generator seeded from `--seed`
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Resolve an export path, creating the directory and asking once before
    /// anything is overwritten.
    fn target(&mut self, file_name: &str) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.export_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

        let path = dir.join(file_name);
        if path.exists() && !self.overwrite_confirmed {
            if !confirm_overwrite(&[path.as_path()], self.no_confirm)? {
                anyhow::bail!("Export cancelled: {} already exists", path.display());
            }
            self.overwrite_confirmed = true;
        }
        Ok(Some(path))
    }

    fn record(&mut self, path: PathBuf) {
        log::info!("Exported {}", path.display());
        if !self.quiet {
            print_saved(&path);
        }
        self.written.push(path);
    }

    /// Write results wrapped with run metadata as JSON.
    pub fn export_json<T: Serialize>(&mut self, file_name: &str, results: &T) -> Result<()> {
        if let Some(path) = self.target(file_name)? {
            export_json(&self.metadata, results, &path)?;
            self.record(path);
        }
        Ok(())
    }

    /// Write plot series as CSV columns.
    pub fn export_series(&mut self, file_name: &str, series: Vec<(String, Vec<f64>)>) -> Result<()> {
        if let Some(path) = self.target(file_name)? {
            export_series(&path, series)?;
            self.record(path);
        }
        Ok(())
    }

    /// Write a full chain (burn-in included) as CSV.
    pub fn export_chain(&mut self, file_name: &str, names: &[String], chain: &Chain) -> Result<()> {
        if let Some(path) = self.target(file_name)? {
            export_chain(&path, names, chain)?;
            self.record(path);
        }
        Ok(())
    }

    /// Zip the exported files when `--bundle` was given.
    pub fn finish(self) -> Result<()> {
        if !self.bundle || self.written.is_empty() {
            return Ok(());
        }
        let Some(dir) = &self.export_dir else {
            return Ok(());
        };
        let zip_path = dir.join(format!("statlab_{}.zip", self.metadata.analysis));
        package_reports(&self.written, &zip_path)?;
        if !self.quiet {
            print_saved(&zip_path);
        }
        Ok(())
    }
}

/// Posterior results as exported
#[derive(Serialize)]
struct PosteriorExport<'a> {
    config: &'a MetropolisConfig,
    acceptance_rate: f64,
    summaries: &'a [PosteriorSummary],
}

/// Run Metropolis-Hastings on `target`, print the summary and trace plots,
/// and export the summary and the chain under `prefix`.
pub(crate) fn run_sampler<D: LogDensity>(
    target: &D,
    names: &[String],
    initial: &[f64],
    proposal_sd: Vec<f64>,
    args: &SamplerArgs,
    ctx: &mut RunContext,
    prefix: &str,
) -> Result<Chain> {
    let mut config = MetropolisConfig::new(proposal_sd);
    config.steps = args.steps;
    config.burn_in = args.burn_in;

    let pb = sampler_progress(config.steps, ctx.quiet);
    let mut rng = ctx.rng();
    let chain = metropolis_hastings(target, initial, &config, &mut rng, Some(&pb))?;
    finish_with_success(&pb, &format!("{} draws", config.steps));

    let summaries = chain.summarize(names);
    let acceptance = chain.acceptance_rate();
    display_posterior_table(&summaries, acceptance);
    if !(0.1..=0.7).contains(&acceptance) {
        print_warning(&format!(
            "Acceptance rate {:.1}% is far from the usual 20-50%; consider another --proposal-sd",
            acceptance * 100.0
        ));
    }

    println!();
    for (j, name) in names.iter().enumerate() {
        print_sparkline(name, &chain.trace(j));
    }
    if let Some(first) = names.first() {
        let retained: Vec<f64> = chain.retained().iter().map(|d| d[0]).collect();
        print_histogram(&format!("Posterior of {}", first), &retained, 20);
    }

    ctx.export_json(
        &format!("{}_posterior.json", prefix),
        &PosteriorExport {
            config: &config,
            acceptance_rate: acceptance,
            summaries: &summaries,
        },
    )?;
    ctx.export_chain(&format!("{}_chain.csv", prefix), names, &chain)?;

    Ok(chain)
}

/// Load the input file and print its shape.
pub(crate) fn load_input(path: &Path, infer_schema_length: usize) -> Result<DataFrame> {
    let (df, rows, cols, memory_mb) = load_dataset_with_progress(path, infer_schema_length)?;
    print_success("Dataset loaded");
    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    Ok(df)
}

/// Join column names for config cards
pub(crate) fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

pub(crate) fn series(name: &str, values: Vec<f64>) -> (String, Vec<f64>) {
    (name.to_string(), values)
}
