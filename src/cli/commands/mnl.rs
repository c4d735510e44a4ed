//! `mnl` and `simulate-conjoint`

use std::time::Instant;

use anyhow::Result;

use super::{join_or_none, load_input, run_sampler, RunContext};
use crate::cli::args::{MnlArgs, SimulateConjointArgs};
use crate::pipeline::{
    choice_probabilities, fit_mnl, parse_baselines, require_columns, simulate_conjoint,
    BfgsConfig, ConjointConfig, DesignSpec, MnlData, MnlPosterior, MnlSpec,
};
use crate::report::{display_mle_table, write_csv};
use crate::utils::{
    create_spinner, finish_with_success, print_config, print_count, print_info, print_saved,
    print_step_header, print_step_time, print_warning,
};

const INDICATOR_PROPOSAL_SD: f64 = 0.05;
const NUMERIC_PROPOSAL_SD: f64 = 0.005;

pub fn run_mnl(args: &MnlArgs, ctx: &mut RunContext) -> Result<()> {
    print_config(
        "Multinomial logit",
        &[
            ("Input", args.data.input.display().to_string()),
            ("Respondent", args.resp.clone()),
            ("Task", args.task.clone()),
            ("Choice", args.choice.clone()),
            ("Numeric", join_or_none(&args.numeric)),
            ("Categorical", join_or_none(&args.categorical)),
            ("Bayesian", args.sampler.bayes.to_string()),
        ],
    );

    print_step_header(1, "Load Choice Data");
    let step_start = Instant::now();
    let df = load_input(&args.data.input, args.data.infer_schema_length)?;

    let mut required = vec![args.resp.clone(), args.task.clone(), args.choice.clone()];
    required.extend(args.numeric.iter().cloned());
    required.extend(args.categorical.iter().cloned());
    require_columns(&df, &required)?;

    let spec = MnlSpec {
        resp_col: args.resp.clone(),
        task_col: args.task.clone(),
        choice_col: args.choice.clone(),
        design: DesignSpec {
            numeric: args.numeric.clone(),
            categorical: args.categorical.clone(),
            baselines: parse_baselines(&args.baseline)?,
            ..Default::default()
        },
    };
    let data = MnlData::from_dataframe(&df, &spec)?;
    print_count("choice tasks", data.tasks.len(), None);
    print_count("parameters", data.n_params(), Some(&format!("({})", data.names().join(", "))));
    print_step_time(step_start.elapsed());

    print_step_header(2, "Maximum Likelihood");
    let step_start = Instant::now();
    let spinner = create_spinner("Maximising the log-likelihood...");
    let fit = fit_mnl(&data, &BfgsConfig::default())?;
    finish_with_success(&spinner, &format!("Converged in {} iterations", fit.iterations));
    if !fit.converged {
        print_warning("Optimiser stopped before convergence; estimates may be unreliable");
    }
    display_mle_table("MULTINOMIAL LOGIT (MLE)", &fit)?;
    print_info(&format!(
        "Log-likelihood {:.3}, AIC {:.3}",
        fit.log_likelihood,
        fit.aic()
    ));
    ctx.export_json("mnl_mle.json", &fit)?;
    ctx.export_series(
        "mnl_probabilities.csv",
        vec![(
            "probability".to_string(),
            choice_probabilities(&fit.estimates, &data),
        )],
    )?;
    print_step_time(step_start.elapsed());

    if args.sampler.bayes {
        print_step_header(3, "Metropolis-Hastings");
        let step_start = Instant::now();

        let dim = data.n_params();
        let (prior_sds, proposal_sd): (Vec<f64>, Vec<f64>) = (0..dim)
            .map(|j| {
                if data.is_indicator(j) {
                    (
                        args.sampler.prior_sd,
                        args.sampler.proposal_sd.unwrap_or(INDICATOR_PROPOSAL_SD),
                    )
                } else {
                    (
                        args.sampler.numeric_prior_sd,
                        args.sampler
                            .numeric_proposal_sd
                            .unwrap_or(NUMERIC_PROPOSAL_SD),
                    )
                }
            })
            .unzip();

        let posterior = MnlPosterior::new(&data, &prior_sds)?;
        let initial = vec![0.0; dim];
        run_sampler(
            &posterior,
            data.names(),
            &initial,
            proposal_sd,
            &args.sampler,
            ctx,
            "mnl",
        )?;
        print_step_time(step_start.elapsed());
    }

    Ok(())
}

pub fn run_simulate_conjoint(args: &SimulateConjointArgs, ctx: &mut RunContext) -> Result<()> {
    let config = ConjointConfig {
        respondents: args.respondents,
        tasks: args.tasks,
        alternatives: args.alternatives,
        ..Default::default()
    };

    print_config(
        "Conjoint simulation",
        &[
            ("Respondents", config.respondents.to_string()),
            ("Tasks", config.tasks.to_string()),
            ("Alternatives", config.alternatives.to_string()),
            ("Seed", ctx.seed.to_string()),
            ("Output", args.output.display().to_string()),
        ],
    );

    let mut rng = ctx.rng();
    let mut df = simulate_conjoint(&config, &mut rng)?;
    print_count("alternatives simulated", df.height(), None);

    write_csv(&mut df, &args.output)?;
    print_saved(&args.output);
    ctx.export_json("conjoint_config.json", &config)?;

    Ok(())
}
