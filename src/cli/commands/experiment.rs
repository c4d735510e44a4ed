//! `experiment`

use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;

use super::{join_or_none, load_input, RunContext};
use crate::cli::args::ExperimentArgs;
use crate::pipeline::{
    balance_test, build_design_matrix, column_as_f64, fit_ols, fit_probit, group_rates,
    probit_average_marginal_effect, require_columns, treatment_t_test, BfgsConfig, DesignMatrix,
    DesignSpec, MleFit, OlsFit, TTestResult,
};
use crate::report::{
    display_balance_table, display_group_rates, display_mle_table, display_ols_table,
    display_ttest_table,
};
use crate::utils::{
    create_spinner, finish_with_success, print_config, print_info, print_step_header,
    print_step_time, print_warning,
};

#[derive(Serialize)]
struct ProbitExport<'a> {
    outcome: &'a str,
    fit: &'a MleFit,
    average_marginal_effect: f64,
}

/// Rows of `df` complete in `treatment` and `outcome`, as a design with an
/// intercept plus the indicator and the outcome vector.
fn complete_cases(df: &DataFrame, treatment: &str, outcome: &str) -> Result<(DesignMatrix, Vec<f64>)> {
    let subset = df
        .select([treatment, outcome])?
        .drop_nulls::<String>(None)
        .with_context(|| format!("Failed to drop missing values of '{}'", outcome))?;
    let spec = DesignSpec {
        numeric: vec![treatment.to_string()],
        ..DesignSpec::with_intercept()
    };
    let x = build_design_matrix(&subset, &spec)?;
    let y = column_as_f64(&subset, outcome)?;
    Ok((x, y))
}

pub fn run_experiment(args: &ExperimentArgs, ctx: &mut RunContext) -> Result<()> {
    print_config(
        "Field experiment",
        &[
            ("Input", args.data.input.display().to_string()),
            ("Treatment", args.treatment.clone()),
            ("Outcomes", join_or_none(&args.outcomes)),
            ("Balance", join_or_none(&args.balance)),
            (
                "Group column",
                args.group_col.clone().unwrap_or_else(|| "(none)".to_string()),
            ),
            ("Probit", args.probit.to_string()),
        ],
    );

    print_step_header(1, "Load Experiment Data");
    let step_start = Instant::now();
    let df = load_input(&args.data.input, args.data.infer_schema_length)?;
    let mut required = vec![args.treatment.clone()];
    required.extend(args.outcomes.iter().cloned());
    required.extend(args.balance.iter().cloned());
    if let Some(group) = &args.group_col {
        required.push(group.clone());
    }
    require_columns(&df, &required)?;
    print_step_time(step_start.elapsed());

    if !args.balance.is_empty() {
        print_step_header(2, "Covariate Balance");
        let rows = balance_test(&df, &args.treatment, &args.balance)?;
        display_balance_table(&rows);
        let unbalanced: Vec<&str> = rows
            .iter()
            .filter(|r| r.t_test.p_value < 0.05)
            .map(|r| r.covariate.as_str())
            .collect();
        if unbalanced.is_empty() {
            print_info("No covariate differs across arms at the 5% level");
        } else {
            print_warning(&format!(
                "Imbalanced at the 5% level: {}",
                unbalanced.join(", ")
            ));
        }
        ctx.export_json("experiment_balance.json", &rows)?;
    }

    print_step_header(3, "Treatment Effects");
    let step_start = Instant::now();
    let mut tests: Vec<(String, TTestResult)> = Vec::with_capacity(args.outcomes.len());
    let mut regressions: Vec<(String, OlsFit)> = Vec::with_capacity(args.outcomes.len());
    for outcome in &args.outcomes {
        tests.push((
            outcome.clone(),
            treatment_t_test(&df, &args.treatment, outcome)?,
        ));
        let (x, y) = complete_cases(&df, &args.treatment, outcome)?;
        regressions.push((outcome.clone(), fit_ols(&x, &y)?));
    }
    display_ttest_table(&tests);
    for (outcome, fit) in &regressions {
        display_ols_table(&format!("OLS: {} ON {}", outcome.to_uppercase(), args.treatment.to_uppercase()), fit);
    }
    ctx.export_json("experiment_ttests.json", &tests)?;
    ctx.export_json("experiment_ols.json", &regressions)?;
    print_step_time(step_start.elapsed());

    // group rates and the probit use the first outcome
    let primary = args
        .outcomes
        .first()
        .context("At least one outcome column is required")?;

    if let Some(group) = &args.group_col {
        print_step_header(4, "Group Rates");
        let rates = group_rates(&df, group, primary)?;
        display_group_rates(primary, &rates);
        ctx.export_json("experiment_group_rates.json", &rates)?;
    }

    if args.probit {
        print_step_header(5, "Probit");
        let step_start = Instant::now();
        let (x, y) = complete_cases(&df, &args.treatment, primary)?;
        let spinner = create_spinner("Maximising the probit log-likelihood...");
        let fit = fit_probit(&x, &y, &BfgsConfig::default())?;
        finish_with_success(&spinner, &format!("Converged in {} iterations", fit.iterations));
        if !fit.converged {
            print_warning("Optimiser stopped before convergence; estimates may be unreliable");
        }
        display_mle_table(&format!("PROBIT: {}", primary.to_uppercase()), &fit)?;

        let ame = probit_average_marginal_effect(&fit, &x, &args.treatment)?;
        print_info(&format!(
            "Average marginal effect of {}: {:.5} ({:.3} percentage points)",
            args.treatment,
            ame,
            ame * 100.0
        ));
        ctx.export_json(
            "experiment_probit.json",
            &ProbitExport {
                outcome: primary,
                fit: &fit,
                average_marginal_effect: ame,
            },
        )?;
        print_step_time(step_start.elapsed());
    }

    Ok(())
}
