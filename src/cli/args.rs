//! Command-line argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// statlab - Likelihood models, MCMC, clustering and field-experiment analysis
#[derive(Parser, Debug)]
#[command(name = "statlab")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug logs (optimiser iterations, sampler acceptance)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress the banner, progress bars and logs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Seed for every random number generator
    #[arg(long, global = true, default_value = "42")]
    pub seed: u64,

    /// Directory for JSON results and CSV plot series.
    /// Nothing is written when omitted.
    #[arg(long, global = true)]
    pub export_dir: Option<PathBuf>,

    /// Bundle the exported files into a single zip archive
    #[arg(long, global = true, requires = "export_dir")]
    pub bundle: bool,

    /// Overwrite existing export files without asking
    #[arg(long, global = true, default_value = "false")]
    pub no_confirm: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit a multinomial logit to choice-experiment data
    Mnl(MnlArgs),

    /// Simulate a conjoint dataset (brand, ad, price) and write it as CSV
    SimulateConjoint(SimulateConjointArgs),

    /// Fit a Poisson regression to count data
    Poisson(PoissonArgs),

    /// Cluster numeric columns with k-means
    Kmeans(KmeansArgs),

    /// Classify with k-nearest neighbours and report accuracy by k
    Knn(KnnArgs),

    /// Analyse a randomised field experiment
    Experiment(ExperimentArgs),

    /// Law of large numbers and central limit theorem simulations
    Simulate(SimulateArgs),

    /// Convert a CSV or Stata file to Parquet format
    Convert {
        /// Input file path (CSV or DTA)
        input: PathBuf,

        /// Output file path (optional, defaults to input with .parquet extension)
        output: Option<PathBuf>,

        /// Number of rows to use for schema inference (CSV only).
        /// Use 0 for full table scan.
        #[arg(long, default_value = "10000")]
        infer_schema_length: usize,
    },
}

/// Input dataset shared by the file-based commands
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Input file path (CSV, Parquet or DTA)
    pub input: PathBuf,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

/// Metropolis-Hastings settings
#[derive(Args, Debug, Clone)]
pub struct SamplerArgs {
    /// Draw from the posterior with Metropolis-Hastings after the MLE fit
    #[arg(long)]
    pub bayes: bool,

    /// Total sampler steps (burn-in included)
    #[arg(long, default_value = "11000")]
    pub steps: usize,

    /// Leading steps discarded before summarising
    #[arg(long, default_value = "1000")]
    pub burn_in: usize,

    /// Proposal standard deviation for indicator-scale parameters
    #[arg(long, value_parser = validate_positive)]
    pub proposal_sd: Option<f64>,

    /// Proposal standard deviation for continuous-scale parameters
    #[arg(long, value_parser = validate_positive)]
    pub numeric_proposal_sd: Option<f64>,

    /// Prior standard deviation for indicator-scale parameters
    #[arg(long, default_value = "5.0", value_parser = validate_positive)]
    pub prior_sd: f64,

    /// Prior standard deviation for continuous-scale parameters
    #[arg(long, default_value = "1.0", value_parser = validate_positive)]
    pub numeric_prior_sd: f64,
}

#[derive(Args, Debug, Clone)]
pub struct MnlArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Respondent identifier column
    #[arg(long, default_value = "resp")]
    pub resp: String,

    /// Task identifier column (unique within respondent)
    #[arg(long, default_value = "task")]
    pub task: String,

    /// 0/1 column marking the chosen alternative
    #[arg(long, default_value = "choice")]
    pub choice: String,

    /// Attribute columns used as-is (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub numeric: Vec<String>,

    /// Attribute columns expanded into indicators (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub categorical: Vec<String>,

    /// Baseline level of a categorical column, as column=level (repeatable)
    #[arg(long, value_parser = validate_baseline)]
    pub baseline: Vec<String>,

    #[command(flatten)]
    pub sampler: SamplerArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateConjointArgs {
    /// Output CSV path
    pub output: PathBuf,

    /// Number of respondents
    #[arg(long, default_value = "100")]
    pub respondents: usize,

    /// Choice tasks per respondent
    #[arg(long, default_value = "10")]
    pub tasks: usize,

    /// Alternatives per task
    #[arg(long, default_value = "3")]
    pub alternatives: usize,
}

#[derive(Args, Debug, Clone)]
pub struct PoissonArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Count outcome column
    #[arg(short, long)]
    pub target: String,

    /// Covariates used as-is (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub numeric: Vec<String>,

    /// Covariates expanded into indicators (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub categorical: Vec<String>,

    /// Numeric covariates that also get a squared term (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub squared: Vec<String>,

    /// Baseline level of a categorical column, as column=level (repeatable)
    #[arg(long, value_parser = validate_baseline)]
    pub baseline: Vec<String>,

    /// 0/1 design column to switch off and on for every row
    #[arg(long)]
    pub counterfactual: Option<String>,

    #[command(flatten)]
    pub sampler: SamplerArgs,
}

#[derive(Args, Debug, Clone)]
pub struct KmeansArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Numeric columns to cluster on (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub features: Vec<String>,

    /// Number of clusters for the final fit
    #[arg(short, long, default_value = "3")]
    pub k: usize,

    /// Smallest k in the evaluation range
    #[arg(long, default_value = "2")]
    pub k_min: usize,

    /// Largest k in the evaluation range
    #[arg(long, default_value = "7")]
    pub k_max: usize,

    /// Z-score every feature before clustering
    #[arg(long)]
    pub standardize: bool,

    /// Maximum Lloyd iterations
    #[arg(long, default_value = "100")]
    pub max_iter: usize,
}

#[derive(Args, Debug, Clone)]
pub struct KnnArgs {
    /// Labelled dataset; when omitted, synthetic boundary data is generated
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Feature columns (comma-separated, with --input)
    #[arg(long, value_delimiter = ',', requires = "input")]
    pub features: Vec<String>,

    /// Integer label column (with --input)
    #[arg(long, requires = "input")]
    pub target: Option<String>,

    /// Share of rows used for training (with --input)
    #[arg(long, default_value = "0.7", value_parser = validate_fraction)]
    pub train_frac: f64,

    /// Synthetic training points
    #[arg(long, default_value = "100")]
    pub train_size: usize,

    /// Synthetic test points
    #[arg(long, default_value = "100")]
    pub test_size: usize,

    /// Seed for the synthetic training set (defaults to --seed)
    #[arg(long)]
    pub train_seed: Option<u64>,

    /// Seed for the synthetic test set
    #[arg(long, default_value = "2025")]
    pub test_seed: u64,

    /// Evaluate k = 1..=k_max
    #[arg(long, default_value = "30")]
    pub k_max: usize,

    /// Number of rows to use for schema inference (CSV only)
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ExperimentArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// 0/1 treatment indicator column
    #[arg(long, default_value = "treatment")]
    pub treatment: String,

    /// Outcome columns compared across arms (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub outcomes: Vec<String>,

    /// Pre-treatment covariates to check for balance (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub balance: Vec<String>,

    /// Column whose levels split the first outcome into group rates
    #[arg(long)]
    pub group_col: Option<String>,

    /// Fit a probit of the first outcome on the treatment indicator
    #[arg(long)]
    pub probit: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Success probability of the control arm
    #[arg(long, default_value = "0.018", value_parser = validate_probability)]
    pub p_control: f64,

    /// Success probability of the treatment arm
    #[arg(long, default_value = "0.022", value_parser = validate_probability)]
    pub p_treatment: f64,

    /// Paired draws for the law-of-large-numbers path
    #[arg(long, default_value = "10000")]
    pub draws: usize,

    /// Replications per sample size for the CLT experiment
    #[arg(long, default_value = "1000")]
    pub reps: usize,

    /// Sample sizes for the CLT experiment (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "50,200,500,1000")]
    pub sample_sizes: Vec<usize>,
}

/// Default output path for `convert`: the input with a `.parquet` extension.
pub fn default_parquet_path(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    parent.join(format!("{}.parquet", stem))
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.parse()
        .map_err(|_| format!("'{}' is not a valid number", s))
}

/// Validator for probabilities in [0, 1]
fn validate_probability(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!("probability must be between 0.0 and 1.0, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for fractions strictly between 0 and 1
fn validate_fraction(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if value <= 0.0 || value >= 1.0 {
        Err(format!("fraction must be strictly between 0 and 1, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for standard deviations
fn validate_positive(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("value must be positive, got {}", value))
    }
}

/// Validator for column=level baselines
fn validate_baseline(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((col, level)) if !col.trim().is_empty() && !level.trim().is_empty() => {
            Ok(s.to_string())
        }
        _ => Err(format!("baseline must have the form column=level, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_validators() {
        assert!(validate_probability("0.5").is_ok());
        assert!(validate_probability("1.5").is_err());
        assert!(validate_fraction("1.0").is_err());
        assert!(validate_fraction("0.3").is_ok());
        assert!(validate_positive("0").is_err());
        assert!(validate_baseline("brand=H").is_ok());
        assert!(validate_baseline("brand").is_err());
        assert!(validate_baseline("=H").is_err());
    }

    #[test]
    fn test_parse_mnl_command() {
        let cli = Cli::try_parse_from([
            "statlab",
            "--seed",
            "7",
            "mnl",
            "data.csv",
            "--categorical",
            "brand,ad",
            "--numeric",
            "price",
            "--baseline",
            "brand=H",
            "--bayes",
        ])
        .unwrap();
        assert_eq!(cli.seed, 7);
        match cli.command {
            Commands::Mnl(args) => {
                assert_eq!(args.categorical, vec!["brand", "ad"]);
                assert_eq!(args.numeric, vec!["price"]);
                assert!(args.sampler.bayes);
                assert_eq!(args.sampler.steps, 11_000);
                assert_eq!(args.sampler.prior_sd, 5.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bundle_requires_export_dir() {
        assert!(Cli::try_parse_from(["statlab", "--bundle", "simulate"]).is_err());
    }

    #[test]
    fn test_default_parquet_path() {
        assert_eq!(
            default_parquet_path(Path::new("/tmp/data.dta")),
            PathBuf::from("/tmp/data.parquet")
        );
    }
}
