//! `simulate`

use std::time::Instant;

use anyhow::Result;

use super::{series, RunContext};
use crate::cli::args::SimulateArgs;
use crate::pipeline::{simulate_clt, simulate_lln};
use crate::report::{display_clt_table, print_histogram, print_sparkline};
use crate::utils::{print_config, print_info, print_step_header, print_step_time};

pub fn run_simulate(args: &SimulateArgs, ctx: &mut RunContext) -> Result<()> {
    let true_difference = args.p_treatment - args.p_control;
    print_config(
        "LLN / CLT simulation",
        &[
            ("p control", args.p_control.to_string()),
            ("p treatment", args.p_treatment.to_string()),
            ("Draws", args.draws.to_string()),
            ("Replications", args.reps.to_string()),
            (
                "Sample sizes",
                args.sample_sizes
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        ],
    );

    let mut rng = ctx.rng();

    print_step_header(1, "Law of Large Numbers");
    let step_start = Instant::now();
    let path = simulate_lln(args.p_control, args.p_treatment, args.draws, &mut rng)?;
    print_sparkline("Running mean", &path);
    if let Some(last) = path.last() {
        print_info(&format!(
            "Average after {} draws: {:.5} (true difference {:.5})",
            path.len(),
            last,
            true_difference
        ));
    }
    ctx.export_series(
        "lln_running_mean.csv",
        vec![
            series("draw", (1..=path.len()).map(|i| i as f64).collect()),
            series("running_mean", path),
        ],
    )?;
    print_step_time(step_start.elapsed());

    print_step_header(2, "Central Limit Theorem");
    let step_start = Instant::now();
    let summaries = simulate_clt(
        args.p_control,
        args.p_treatment,
        &args.sample_sizes,
        args.reps,
        &mut rng,
    )?;
    display_clt_table(&summaries);
    for summary in &summaries {
        print_histogram(
            &format!("Averages at n = {}", summary.n),
            &summary.means,
            20,
        );
    }

    ctx.export_json("clt_summary.json", &summaries)?;
    ctx.export_series(
        "clt_means.csv",
        summaries
            .iter()
            .map(|s| (format!("n_{}", s.n), s.means.clone()))
            .collect(),
    )?;
    print_step_time(step_start.elapsed());

    Ok(())
}
