//! Multinomial logit (conditional logit) for choice experiments
//!
//! Each choice task offers a handful of alternatives described by attribute
//! columns. The probability of choosing alternative `j` in task `t` is the
//! softmax of the linear utilities `x_j . beta` within that task.

use anyhow::Result;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Gumbel};
use serde::Serialize;
use statrs::distribution::{Continuous, Normal};

use super::choice::{group_choice_tasks, ChoiceTask};
use super::encoding::{build_design_matrix, DesignMatrix, DesignSpec};
use super::error::ModelError;
use super::mcmc::LogDensity;
use super::optim::{fit_mle, BfgsConfig, MleFit, Objective};

/// Column roles for a choice dataset
#[derive(Debug, Clone)]
pub struct MnlSpec {
    pub resp_col: String,
    pub task_col: String,
    pub choice_col: String,
    /// Attribute columns; the intercept flag is ignored because a constant
    /// cancels out of the within-task softmax
    pub design: DesignSpec,
}

/// Alternatives and their grouping into tasks
#[derive(Debug, Clone)]
pub struct MnlData {
    pub design: DesignMatrix,
    pub tasks: Vec<ChoiceTask>,
}

impl MnlData {
    pub fn from_dataframe(df: &DataFrame, spec: &MnlSpec) -> Result<Self> {
        let tasks = group_choice_tasks(df, &spec.resp_col, &spec.task_col, &spec.choice_col)?;

        let mut design_spec = spec.design.clone();
        design_spec.intercept = false;
        let design = build_design_matrix(df, &design_spec)?;

        Ok(Self { design, tasks })
    }

    pub fn names(&self) -> &[String] {
        &self.design.names
    }

    pub fn n_params(&self) -> usize {
        self.design.ncols()
    }

    /// Whether parameter `j` multiplies a 0/1 indicator column.
    pub fn is_indicator(&self, j: usize) -> bool {
        self.design
            .column(j)
            .iter()
            .all(|v| *v == 0.0 || *v == 1.0)
    }
}

/// `log(sum(exp(u)))` without overflow.
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|u| (u - max).exp()).sum::<f64>().ln()
}

/// MNL log-likelihood: `sum_t [u_chosen - log sum_j exp(u_j)]`.
pub fn mnl_log_likelihood(beta: &[f64], data: &MnlData) -> f64 {
    data.tasks
        .iter()
        .map(|task| {
            let utilities: Vec<f64> = task
                .rows
                .iter()
                .map(|&r| data.design.row_dot(r, beta))
                .collect();
            utilities[task.chosen_position()] - log_sum_exp(&utilities)
        })
        .sum()
}

/// Choice probability of every row within its task (same order as the
/// input rows). Probabilities sum to one within each task.
pub fn choice_probabilities(beta: &[f64], data: &MnlData) -> Vec<f64> {
    let mut probabilities = vec![0.0; data.design.nrows()];
    for task in &data.tasks {
        let utilities: Vec<f64> = task
            .rows
            .iter()
            .map(|&r| data.design.row_dot(r, beta))
            .collect();
        let lse = log_sum_exp(&utilities);
        for (&r, u) in task.rows.iter().zip(&utilities) {
            probabilities[r] = (u - lse).exp();
        }
    }
    probabilities
}

/// Negative MNL log-likelihood with its analytic gradient
pub struct MnlNegLogLik<'a> {
    pub data: &'a MnlData,
}

impl Objective for MnlNegLogLik<'_> {
    fn dim(&self) -> usize {
        self.data.n_params()
    }

    fn value(&self, beta: &[f64]) -> f64 {
        -mnl_log_likelihood(beta, self.data)
    }

    fn gradient(&self, beta: &[f64]) -> Vec<f64> {
        let p = self.dim();
        let design = &self.data.design;
        let mut grad = vec![0.0; p];

        for task in &self.data.tasks {
            let utilities: Vec<f64> = task.rows.iter().map(|&r| design.row_dot(r, beta)).collect();
            let lse = log_sum_exp(&utilities);

            for (&r, u) in task.rows.iter().zip(&utilities) {
                let prob = (u - lse).exp();
                for (j, g) in grad.iter_mut().enumerate() {
                    *g += prob * design.data[(r, j)];
                }
            }
            for (j, g) in grad.iter_mut().enumerate() {
                *g -= design.data[(task.chosen, j)];
            }
        }

        grad
    }
}

/// Maximum-likelihood MNL fit starting from zero part-worths.
pub fn fit_mnl(data: &MnlData, config: &BfgsConfig) -> Result<MleFit> {
    let nll = MnlNegLogLik { data };
    let x0 = vec![0.0; data.n_params()];
    fit_mle(&nll, data.names().to_vec(), &x0, config)
}

/// MNL posterior with independent zero-mean normal priors
pub struct MnlPosterior<'a> {
    data: &'a MnlData,
    priors: Vec<Normal>,
}

impl<'a> MnlPosterior<'a> {
    pub fn new(data: &'a MnlData, prior_sds: &[f64]) -> Result<Self> {
        if prior_sds.len() != data.n_params() {
            return Err(ModelError::DimensionMismatch {
                what: "prior standard deviations".to_string(),
                expected: data.n_params(),
                actual: prior_sds.len(),
            }
            .into());
        }
        let priors = prior_sds
            .iter()
            .map(|&sd| Normal::new(0.0, sd))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { data, priors })
    }

    pub fn log_prior(&self, beta: &[f64]) -> f64 {
        beta.iter()
            .zip(&self.priors)
            .map(|(b, prior)| prior.ln_pdf(*b))
            .sum()
    }
}

impl LogDensity for MnlPosterior<'_> {
    fn dim(&self) -> usize {
        self.data.n_params()
    }

    fn log_density(&self, beta: &[f64]) -> f64 {
        mnl_log_likelihood(beta, self.data) + self.log_prior(beta)
    }
}

/// Settings for simulating a conjoint dataset
#[derive(Debug, Clone, Serialize)]
pub struct ConjointConfig {
    pub respondents: usize,
    pub tasks: usize,
    pub alternatives: usize,
    /// Brand levels and their part-worths
    pub brands: Vec<(String, f64)>,
    /// Part-worth of showing ads
    pub ad_effect: f64,
    /// Utility per unit of price
    pub price_coef: f64,
    /// Price levels shown
    pub prices: Vec<i64>,
}

impl Default for ConjointConfig {
    fn default() -> Self {
        Self {
            respondents: 100,
            tasks: 10,
            alternatives: 3,
            brands: vec![
                ("N".to_string(), 1.0),
                ("P".to_string(), 0.5),
                ("H".to_string(), 0.0),
            ],
            ad_effect: -0.8,
            price_coef: -0.1,
            prices: (8..=32).step_by(4).collect(),
        }
    }
}

/// Simulate choices with utility `part-worths + Gumbel(0, 1)`.
///
/// Columns: `resp`, `task`, `brand`, `ad`, `price`, `choice`; the
/// max-utility alternative of each task has `choice = 1`.
pub fn simulate_conjoint<R: Rng>(config: &ConjointConfig, rng: &mut R) -> Result<DataFrame> {
    if config.respondents == 0 || config.tasks == 0 || config.alternatives < 2 {
        return Err(ModelError::InvalidConfig(
            "need at least one respondent, one task and two alternatives".to_string(),
        )
        .into());
    }
    if config.brands.is_empty() || config.prices.is_empty() {
        return Err(ModelError::InvalidConfig(
            "brand and price levels must not be empty".to_string(),
        )
        .into());
    }

    let gumbel = Gumbel::new(0.0, 1.0)?;
    let capacity = config.respondents * config.tasks * config.alternatives;
    let mut resp = Vec::with_capacity(capacity);
    let mut task = Vec::with_capacity(capacity);
    let mut brand = Vec::with_capacity(capacity);
    let mut ad = Vec::with_capacity(capacity);
    let mut price = Vec::with_capacity(capacity);
    let mut choice = Vec::with_capacity(capacity);

    for r in 1..=config.respondents {
        for t in 1..=config.tasks {
            let mut best: Option<(usize, f64)> = None;
            let start = choice.len();

            for a in 0..config.alternatives {
                let (brand_name, brand_pw) = config
                    .brands
                    .choose(rng)
                    .cloned()
                    .unwrap_or_default();
                let has_ad: i64 = rng.gen_range(0..=1);
                let p = config.prices.choose(rng).copied().unwrap_or_default();

                let utility = brand_pw
                    + config.ad_effect * has_ad as f64
                    + config.price_coef * p as f64
                    + gumbel.sample(rng);

                if best.map_or(true, |(_, u)| utility > u) {
                    best = Some((a, utility));
                }

                resp.push(r as i64);
                task.push(t as i64);
                brand.push(brand_name);
                ad.push(has_ad);
                price.push(p);
                choice.push(0i64);
            }

            if let Some((a, _)) = best {
                choice[start + a] = 1;
            }
        }
    }

    let df = DataFrame::new(vec![
        Column::new("resp".into(), resp),
        Column::new("task".into(), task),
        Column::new("brand".into(), brand),
        Column::new("ad".into(), ad),
        Column::new("price".into(), price),
        Column::new("choice".into(), choice),
    ])?;

    Ok(df)
}
