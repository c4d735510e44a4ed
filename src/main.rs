//! statlab: statistical modelling CLI
//!
//! Multinomial logit and Poisson likelihood fits, Metropolis-Hastings
//! posteriors, k-means and k-NN, field-experiment analysis and sampling
//! simulations over CSV, Parquet and Stata files.

mod cli;
mod pipeline;
mod report;
mod utils;

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use cli::commands::{
    run_experiment, run_kmeans, run_knn, run_mnl, run_poisson, run_simulate,
    run_simulate_conjoint, RunContext,
};
use cli::{Cli, Commands};
use utils::{init_logger, print_banner, print_completion};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    let (analysis, input): (&str, Option<&Path>) = match &cli.command {
        // Conversion prints its own summary
        Commands::Convert {
            input,
            output,
            infer_schema_length,
        } => return cli::convert::run_convert(input, output.as_deref(), *infer_schema_length),
        Commands::Mnl(args) => ("mnl", Some(args.data.input.as_path())),
        Commands::SimulateConjoint(_) => ("simulate-conjoint", None),
        Commands::Poisson(args) => ("poisson", Some(args.data.input.as_path())),
        Commands::Kmeans(args) => ("kmeans", Some(args.data.input.as_path())),
        Commands::Knn(args) => ("knn", args.input.as_deref()),
        Commands::Experiment(args) => ("experiment", Some(args.data.input.as_path())),
        Commands::Simulate(_) => ("simulate", None),
    };

    if !cli.quiet {
        print_banner(env!("CARGO_PKG_VERSION"));
    }

    let mut ctx = RunContext::new(&cli, analysis, input);
    match &cli.command {
        Commands::Mnl(args) => run_mnl(args, &mut ctx)?,
        Commands::SimulateConjoint(args) => run_simulate_conjoint(args, &mut ctx)?,
        Commands::Poisson(args) => run_poisson(args, &mut ctx)?,
        Commands::Kmeans(args) => run_kmeans(args, &mut ctx)?,
        Commands::Knn(args) => run_knn(args, &mut ctx)?,
        Commands::Experiment(args) => run_experiment(args, &mut ctx)?,
        Commands::Simulate(args) => run_simulate(args, &mut ctx)?,
        Commands::Convert { .. } => {}
    }
    ctx.finish()?;

    if !cli.quiet {
        print_completion(analysis);
    }

    Ok(())
}
