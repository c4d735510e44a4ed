//! Console tables for fitted models and analyses

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{
    AccuracyPoint, BalanceRow, CltSummary, CounterfactualEffect, GlmFit, GroupRate, KEvaluation,
    MleFit, OlsFit, PosteriorSummary, TTestResult,
};

/// Print a section title with an underline, indented like the rest of the output.
pub fn print_section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn number(value: f64, decimals: usize) -> Cell {
    Cell::new(format!("{:.*}", decimals, value)).set_alignment(CellAlignment::Right)
}

/// p-value cell, highlighted when significant at 5%.
fn p_value_cell(p: f64) -> Cell {
    let text = if p < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{:.3}", p)
    };
    let cell = Cell::new(text).set_alignment(CellAlignment::Right);
    if p < 0.05 {
        cell.fg(Color::Green)
    } else {
        cell
    }
}

/// Coefficient table for a maximum-likelihood fit with 95% Wald intervals.
pub fn display_mle_table(title: &str, fit: &MleFit) -> Result<()> {
    print_section("📐", title);

    let intervals = fit.confidence_intervals(0.95)?;
    let p_values = fit.p_values()?;
    let mut table = new_table(&["Parameter", "Estimate", "Std. Error", "z", "p", "95% CI"]);

    for (i, name) in fit.names.iter().enumerate() {
        let (lo, hi) = intervals[i];
        table.add_row(vec![
            Cell::new(name),
            number(fit.estimates[i], 4).add_attribute(Attribute::Bold),
            number(fit.std_errors[i], 4),
            number(fit.estimates[i] / fit.std_errors[i], 2),
            p_value_cell(p_values[i]),
            Cell::new(format!("[{:.4}, {:.4}]", lo, hi)),
        ]);
    }
    print_indented(&table);

    println!();
    println!(
        "      Log-likelihood {}   AIC {}   iterations {}{}",
        style(format!("{:.3}", fit.log_likelihood)).yellow(),
        style(format!("{:.3}", fit.aic())).yellow(),
        fit.iterations,
        if fit.converged {
            String::new()
        } else {
            format!("   {}", style("(not converged)").red())
        }
    );
    Ok(())
}

/// Coefficient table and deviance summary for an IRLS fit.
pub fn display_glm_table(fit: &GlmFit) {
    print_section("📐", "POISSON GLM (IRLS)");

    let mut table = new_table(&["Parameter", "Estimate", "Std. Error", "z"]);
    for ((name, est), se) in fit.names.iter().zip(&fit.coefficients).zip(&fit.std_errors) {
        table.add_row(vec![
            Cell::new(name),
            number(*est, 4).add_attribute(Attribute::Bold),
            number(*se, 4),
            number(est / se, 2),
        ]);
    }
    print_indented(&table);

    println!();
    println!(
        "      Deviance {} on null {}   AIC {}   iterations {}",
        style(format!("{:.3}", fit.deviance)).yellow(),
        style(format!("{:.3}", fit.null_deviance)).dim(),
        style(format!("{:.3}", fit.aic)).yellow(),
        fit.iterations
    );
}

/// Posterior means, standard deviations and 95% credible intervals.
pub fn display_posterior_table(summaries: &[PosteriorSummary], acceptance_rate: f64) {
    print_section("🎲", "POSTERIOR SUMMARY");

    let mut table = new_table(&["Parameter", "Mean", "Std. Dev.", "2.5%", "97.5%"]);
    for s in summaries {
        table.add_row(vec![
            Cell::new(&s.name),
            number(s.mean, 4).add_attribute(Attribute::Bold),
            number(s.sd, 4),
            number(s.lower, 4),
            number(s.upper, 4),
        ]);
    }
    print_indented(&table);

    let color = if (0.15..=0.5).contains(&acceptance_rate) {
        Color::Green
    } else {
        Color::Yellow
    };
    let mut rate = new_table(&["Acceptance rate"]);
    rate.add_row(vec![Cell::new(format!("{:.1}%", acceptance_rate * 100.0)).fg(color)]);
    println!();
    print_indented(&rate);
}

/// Predicted counts with an indicator switched off and on.
pub fn display_counterfactual(effect: &CounterfactualEffect) {
    print_section("🔀", "COUNTERFACTUAL PREDICTION");

    let mut table = new_table(&["Scenario", "Mean predicted count"]);
    table.add_row(vec![
        Cell::new(format!("{} = 0", effect.column)),
        number(effect.mean_off, 4),
    ]);
    table.add_row(vec![
        Cell::new(format!("{} = 1", effect.column)),
        number(effect.mean_on, 4),
    ]);
    table.add_row(vec![
        Cell::new("Difference").add_attribute(Attribute::Bold),
        number(effect.mean_difference, 4)
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
    ]);
    print_indented(&table);
}

/// Within-cluster sum of squares and silhouette per k.
pub fn display_k_evaluation(evaluations: &[KEvaluation]) {
    print_section("🧩", "CLUSTER COUNT EVALUATION");

    let best = evaluations
        .iter()
        .max_by(|a, b| {
            a.silhouette
                .partial_cmp(&b.silhouette)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|e| e.k);

    let mut table = new_table(&["k", "WCSS", "Silhouette"]);
    for e in evaluations {
        let silhouette = number(e.silhouette, 4);
        table.add_row(vec![
            Cell::new(e.k),
            number(e.wcss, 3),
            if Some(e.k) == best {
                silhouette.fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                silhouette
            },
        ]);
    }
    print_indented(&table);
}

/// Cluster sizes and centroids.
pub fn display_centroids(feature_names: &[String], centroids: &[Vec<f64>], labels: &[usize]) {
    print_section("📍", "CLUSTER CENTROIDS");

    let mut headers = vec!["Cluster", "Size"];
    headers.extend(feature_names.iter().map(String::as_str));
    let mut table = new_table(&headers);

    for (c, centroid) in centroids.iter().enumerate() {
        let size = labels.iter().filter(|&&l| l == c).count();
        let mut row = vec![Cell::new(c + 1), Cell::new(size)];
        row.extend(centroid.iter().map(|v| number(*v, 4)));
        table.add_row(row);
    }
    print_indented(&table);
}

/// Test accuracy per k with the best k highlighted.
pub fn display_accuracy_table(curve: &[AccuracyPoint], best: Option<AccuracyPoint>) {
    print_section("🎯", "K-NN TEST ACCURACY");

    let mut table = new_table(&["k", "Accuracy"]);
    for point in curve {
        let cell = Cell::new(format!("{:.2}%", point.accuracy * 100.0))
            .set_alignment(CellAlignment::Right);
        let is_best = best.map(|b| b.k == point.k).unwrap_or(false);
        table.add_row(vec![
            Cell::new(point.k),
            if is_best {
                cell.fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                cell
            },
        ]);
    }
    print_indented(&table);
}

/// Treatment-minus-control t-tests, one row per outcome.
pub fn display_ttest_table(rows: &[(String, TTestResult)]) {
    print_section("🧪", "TREATMENT EFFECTS (WELCH t-TEST)");

    let mut table = new_table(&[
        "Outcome", "Control", "Treatment", "Difference", "t", "df", "p",
    ]);
    for (outcome, t) in rows {
        table.add_row(vec![
            Cell::new(outcome),
            number(t.mean_b, 4),
            number(t.mean_a, 4),
            number(t.difference, 4).add_attribute(Attribute::Bold),
            number(t.t_statistic, 3),
            number(t.df, 1),
            p_value_cell(t.p_value),
        ]);
    }
    print_indented(&table);
}

/// Covariate balance: t-test and OLS estimates of the arm difference.
pub fn display_balance_table(rows: &[BalanceRow]) {
    print_section("⚖️ ", "COVARIATE BALANCE");

    let mut table = new_table(&[
        "Covariate",
        "Control",
        "Treatment",
        "t-test diff",
        "p (t)",
        "OLS coef",
        "p (OLS)",
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.covariate),
            number(row.control_mean, 3),
            number(row.treatment_mean, 3),
            number(row.t_test.difference, 4),
            p_value_cell(row.t_test.p_value),
            number(row.ols_coefficient, 4),
            p_value_cell(row.ols_p_value),
        ]);
    }
    print_indented(&table);
}

/// OLS coefficients with classical standard errors.
pub fn display_ols_table(title: &str, fit: &OlsFit) {
    print_section("📏", title);

    let mut table = new_table(&["Parameter", "Estimate", "Std. Error", "t", "p"]);
    for i in 0..fit.names.len() {
        table.add_row(vec![
            Cell::new(&fit.names[i]),
            number(fit.coefficients[i], 4).add_attribute(Attribute::Bold),
            number(fit.std_errors[i], 4),
            number(fit.t_values[i], 2),
            p_value_cell(fit.p_values[i]),
        ]);
    }
    print_indented(&table);
    println!();
    println!(
        "      R² {}   n {}",
        style(format!("{:.4}", fit.r_squared)).yellow(),
        fit.n
    );
}

/// Outcome rate per group.
pub fn display_group_rates(outcome: &str, rates: &[GroupRate]) {
    print_section("👥", &format!("{} BY GROUP", outcome.to_uppercase()));

    let mut table = new_table(&["Group", "n", "Mean", "Std. Dev."]);
    for rate in rates {
        table.add_row(vec![
            Cell::new(&rate.group),
            Cell::new(rate.n),
            number(rate.mean, 4).add_attribute(Attribute::Bold),
            number(rate.sd, 4),
        ]);
    }
    print_indented(&table);
}

/// Sampling distribution of the average difference per sample size.
pub fn display_clt_table(summaries: &[CltSummary]) {
    print_section("🔔", "SAMPLING DISTRIBUTION OF THE AVERAGE DIFFERENCE");

    let mut table = new_table(&["n", "Mean", "Std. Dev.", "Share ≤ 0"]);
    for s in summaries {
        table.add_row(vec![
            Cell::new(s.n).set_alignment(CellAlignment::Right),
            number(s.mean, 5),
            number(s.sd, 5),
            number(s.share_le_zero, 3),
        ]);
    }
    print_indented(&table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p_value_formatting() {
        assert_eq!(p_value_cell(0.0001).content(), "<0.001");
        assert_eq!(p_value_cell(0.25).content(), "0.250");
    }

    #[test]
    fn test_new_table_headers() {
        let table = new_table(&["a", "b"]);
        let rendered = table.to_string();
        assert!(rendered.contains('a') && rendered.contains('b'));
    }
}
