//! `poisson`

use std::time::Instant;

use anyhow::Result;

use super::{join_or_none, load_input, run_sampler, series, RunContext};
use crate::cli::args::PoissonArgs;
use crate::pipeline::{
    build_design_matrix, column_as_f64, counterfactual_effect, fit_poisson_glm, fit_poisson_mle,
    lambda_mle, lambda_profile, parse_baselines, poisson_log_likelihood, require_columns,
    validate_counts, BfgsConfig, DesignMatrix, DesignSpec, IrlsConfig, PoissonPosterior,
};
use crate::report::{
    display_counterfactual, display_glm_table, display_mle_table, print_histogram,
    print_sparkline,
};
use crate::utils::{
    create_spinner, finish_with_success, print_config, print_info, print_step_header,
    print_step_time, print_warning,
};

const PROFILE_POINTS: usize = 101;

fn is_binary(x: &DesignMatrix, j: usize) -> bool {
    x.column(j).iter().all(|v| *v == 0.0 || *v == 1.0)
}

pub fn run_poisson(args: &PoissonArgs, ctx: &mut RunContext) -> Result<()> {
    print_config(
        "Poisson regression",
        &[
            ("Input", args.data.input.display().to_string()),
            ("Target", args.target.clone()),
            ("Numeric", join_or_none(&args.numeric)),
            ("Categorical", join_or_none(&args.categorical)),
            ("Squared", join_or_none(&args.squared)),
            ("Bayesian", args.sampler.bayes.to_string()),
        ],
    );

    print_step_header(1, "Load Count Data");
    let step_start = Instant::now();
    let df = load_input(&args.data.input, args.data.infer_schema_length)?;

    let mut required = vec![args.target.clone()];
    required.extend(args.numeric.iter().cloned());
    required.extend(args.categorical.iter().cloned());
    required.extend(args.squared.iter().cloned());
    require_columns(&df, &required)?;

    let y = column_as_f64(&df, &args.target)?;
    validate_counts(&y)?;

    let mut numeric = args.numeric.clone();
    for col in &args.squared {
        if !numeric.contains(col) {
            numeric.push(col.clone());
        }
    }
    let spec = DesignSpec {
        numeric,
        categorical: args.categorical.clone(),
        squared: args.squared.clone(),
        baselines: parse_baselines(&args.baseline)?,
        intercept: true,
    };
    let x = build_design_matrix(&df, &spec)?;
    print_step_time(step_start.elapsed());

    print_step_header(2, "Single-Rate Model");
    let lambda = lambda_mle(&y);
    print_info(&format!(
        "λ̂ = {:.4} (log-likelihood {:.3})",
        lambda,
        poisson_log_likelihood(lambda, &y)
    ));
    print_histogram(&format!("Distribution of {}", args.target), &y, 15);

    if lambda > 0.0 {
        let grid: Vec<f64> = (0..PROFILE_POINTS)
            .map(|i| lambda * (0.5 + i as f64 / (PROFILE_POINTS - 1) as f64))
            .collect();
        let profile = lambda_profile(&y, &grid);
        let loglik: Vec<f64> = profile.iter().map(|(_, ll)| *ll).collect();
        print_sparkline("log L(λ)", &loglik);
        ctx.export_series(
            "poisson_lambda_profile.csv",
            vec![series("lambda", grid), series("log_likelihood", loglik)],
        )?;
    }

    print_step_header(3, "Poisson Regression");
    let step_start = Instant::now();
    let spinner = create_spinner("Maximising the log-likelihood...");
    let fit = fit_poisson_mle(&x, &y, &BfgsConfig::default())?;
    finish_with_success(&spinner, &format!("Converged in {} iterations", fit.iterations));
    if !fit.converged {
        print_warning("Optimiser stopped before convergence; estimates may be unreliable");
    }
    display_mle_table("POISSON REGRESSION (MLE)", &fit)?;

    let glm = fit_poisson_glm(&x, &y, &IrlsConfig::default())?;
    if !glm.converged {
        print_warning("IRLS stopped before convergence");
    }
    display_glm_table(&glm);

    let max_gap = fit
        .estimates
        .iter()
        .zip(&glm.coefficients)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    print_info(&format!(
        "Largest difference between BFGS and IRLS estimates: {:.2e}",
        max_gap
    ));
    ctx.export_json("poisson_mle.json", &fit)?;
    ctx.export_json("poisson_glm.json", &glm)?;
    print_step_time(step_start.elapsed());

    if let Some(column) = &args.counterfactual {
        print_step_header(4, "Counterfactual Prediction");
        let effect = counterfactual_effect(&fit.estimates, &x, column)?;
        display_counterfactual(&effect);
        ctx.export_json("poisson_counterfactual.json", &effect)?;
    }

    if args.sampler.bayes {
        print_step_header(5, "Metropolis-Hastings");
        let step_start = Instant::now();

        let dim = x.ncols();
        let (prior_sds, proposal_sd): (Vec<f64>, Vec<f64>) = (0..dim)
            .map(|j| {
                if is_binary(&x, j) {
                    (
                        args.sampler.prior_sd,
                        args.sampler.proposal_sd.unwrap_or(fit.std_errors[j]),
                    )
                } else {
                    (
                        args.sampler.numeric_prior_sd,
                        args.sampler
                            .numeric_proposal_sd
                            .unwrap_or(fit.std_errors[j]),
                    )
                }
            })
            .unzip();

        let posterior = PoissonPosterior::new(&x, &y, &prior_sds)?;
        run_sampler(
            &posterior,
            &x.names,
            &fit.estimates,
            proposal_sd,
            &args.sampler,
            ctx,
            "poisson",
        )?;
        print_step_time(step_start.elapsed());
    }

    Ok(())
}
