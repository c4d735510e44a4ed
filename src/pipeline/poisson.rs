//! Poisson models for count outcomes
//!
//! Two routes to the same regression estimates are provided: direct
//! maximisation of the log-likelihood with BFGS, and the GLM route of
//! iteratively reweighted least squares. The single-rate helpers back the
//! "mean of a Poisson sample is the MLE of its rate" check.

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;
use statrs::distribution::{Continuous, Normal};
use statrs::function::gamma::ln_gamma;

use super::encoding::DesignMatrix;
use super::error::ModelError;
use super::linalg::weighted_least_squares;
use super::mcmc::LogDensity;
use super::optim::{fit_mle, BfgsConfig, MleFit, Objective};
use super::stats::mean;

/// Check the count invariant: finite, non-negative integers.
pub fn validate_counts(y: &[f64]) -> Result<(), ModelError> {
    match y
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0 || v.fract() != 0.0)
    {
        Some((row, &value)) => Err(ModelError::InvalidCount { row, value }),
        None => Ok(()),
    }
}

/// `ln(y!)` for a count.
#[inline]
fn ln_factorial(y: f64) -> f64 {
    ln_gamma(y + 1.0)
}

/// Log-likelihood of i.i.d. counts under a single rate `lambda`.
///
/// Returns `-inf` for a non-positive rate.
pub fn poisson_log_likelihood(lambda: f64, y: &[f64]) -> f64 {
    if !(lambda > 0.0) {
        return f64::NEG_INFINITY;
    }
    y.iter()
        .map(|&yi| yi * lambda.ln() - lambda - ln_factorial(yi))
        .sum()
}

/// Closed-form MLE of the single rate: the sample mean.
pub fn lambda_mle(y: &[f64]) -> f64 {
    mean(y)
}

/// Log-likelihood evaluated over a grid of rates, for plotting.
pub fn lambda_profile(y: &[f64], grid: &[f64]) -> Vec<(f64, f64)> {
    grid.iter()
        .map(|&lambda| (lambda, poisson_log_likelihood(lambda, y)))
        .collect()
}

/// Poisson regression log-likelihood with mean `exp(x . beta)`.
pub fn poisson_regression_log_likelihood(beta: &[f64], x: &DesignMatrix, y: &[f64]) -> f64 {
    (0..x.nrows())
        .map(|i| {
            let eta = x.row_dot(i, beta);
            y[i] * eta - eta.exp() - ln_factorial(y[i])
        })
        .sum()
}

/// Negative Poisson regression log-likelihood with gradient `-X'(y - mu)`
pub struct PoissonNegLogLik<'a> {
    pub x: &'a DesignMatrix,
    pub y: &'a [f64],
}

impl Objective for PoissonNegLogLik<'_> {
    fn dim(&self) -> usize {
        self.x.ncols()
    }

    fn value(&self, beta: &[f64]) -> f64 {
        -poisson_regression_log_likelihood(beta, self.x, self.y)
    }

    fn gradient(&self, beta: &[f64]) -> Vec<f64> {
        let mut grad = vec![0.0; self.dim()];
        for i in 0..self.x.nrows() {
            let residual = self.y[i] - self.x.row_dot(i, beta).exp();
            for (j, g) in grad.iter_mut().enumerate() {
                *g -= self.x.data[(i, j)] * residual;
            }
        }
        grad
    }
}

fn check_inputs(x: &DesignMatrix, y: &[f64]) -> Result<(), ModelError> {
    if x.nrows() != y.len() {
        return Err(ModelError::DimensionMismatch {
            what: "outcome length".to_string(),
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    validate_counts(y)
}

/// Starting values: intercept at `ln(mean y)` (when present), zeros elsewhere.
fn starting_values(x: &DesignMatrix, y: &[f64]) -> Vec<f64> {
    let mut x0 = vec![0.0; x.ncols()];
    if let Some(idx) = x.column_index("intercept") {
        let ybar = mean(y);
        if ybar > 0.0 {
            x0[idx] = ybar.ln();
        }
    }
    x0
}

/// Fit a Poisson regression by maximum likelihood (BFGS).
pub fn fit_poisson_mle(x: &DesignMatrix, y: &[f64], config: &BfgsConfig) -> Result<MleFit> {
    check_inputs(x, y)?;
    let nll = PoissonNegLogLik { x, y };
    let x0 = starting_values(x, y);
    fit_mle(&nll, x.names.clone(), &x0, config)
}

/// IRLS settings
#[derive(Debug, Clone, Serialize)]
pub struct IrlsConfig {
    pub max_iter: usize,
    /// Relative deviance change at which iteration stops
    pub tol: f64,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        Self {
            max_iter: 25,
            tol: 1e-8,
        }
    }
}

/// A Poisson GLM fitted by IRLS
#[derive(Debug, Clone, Serialize)]
pub struct GlmFit {
    pub names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub deviance: f64,
    pub null_deviance: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Poisson deviance `2 * sum[y ln(y / mu) - (y - mu)]` with `0 ln 0 = 0`.
pub fn poisson_deviance(y: &[f64], mu: &[f64]) -> f64 {
    2.0 * y
        .iter()
        .zip(mu)
        .map(|(&yi, &mi)| {
            let term = if yi > 0.0 { yi * (yi / mi).ln() } else { 0.0 };
            term - (yi - mi)
        })
        .sum::<f64>()
}

/// Fit a Poisson GLM with log link by iteratively reweighted least squares.
pub fn fit_poisson_glm(x: &DesignMatrix, y: &[f64], config: &IrlsConfig) -> Result<GlmFit> {
    check_inputs(x, y)?;
    if config.max_iter == 0 {
        return Err(ModelError::InvalidConfig("max_iter must be at least 1".to_string()).into());
    }

    let n = x.nrows();
    let mut mu: Vec<f64> = y.iter().map(|yi| yi + 0.1).collect();
    let mut eta: Vec<f64> = mu.iter().map(|m| m.ln()).collect();
    let mut deviance = poisson_deviance(y, &mu);
    let mut coefficients = vec![0.0; x.ncols()];
    let mut std_errors = vec![f64::NAN; x.ncols()];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iter {
        iterations += 1;

        let z: Vec<f64> = (0..n).map(|i| eta[i] + (y[i] - mu[i]) / mu[i]).collect();
        let (beta, inverse) = weighted_least_squares(&x.data, &mu, &z)?;

        eta = x.linear_predictor(&beta);
        mu = eta.iter().map(|e| e.exp()).collect();
        let new_deviance = poisson_deviance(y, &mu);
        if !new_deviance.is_finite() {
            return Err(ModelError::NonFiniteObjective {
                value: new_deviance,
            }
            .into());
        }

        coefficients = beta;
        std_errors = (0..inverse.nrows()).map(|j| inverse[(j, j)].sqrt()).collect();

        let change = (new_deviance - deviance).abs() / (new_deviance.abs() + 0.1);
        debug!("IRLS iteration {}: deviance {:.6}", iterations, new_deviance);
        deviance = new_deviance;

        if change < config.tol {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!("IRLS did not converge in {} iterations", config.max_iter);
    }

    let ybar = mean(y);
    let null_deviance = poisson_deviance(y, &vec![ybar; n]);
    let log_likelihood = poisson_regression_log_likelihood(&coefficients, x, y);
    let aic = -2.0 * log_likelihood + 2.0 * x.ncols() as f64;

    Ok(GlmFit {
        names: x.names.clone(),
        coefficients,
        std_errors,
        deviance,
        null_deviance,
        log_likelihood,
        aic,
        iterations,
        converged,
    })
}

/// Average predicted counts with an indicator forced off and on
#[derive(Debug, Clone, Serialize)]
pub struct CounterfactualEffect {
    pub column: String,
    /// Mean prediction with the indicator set to 0 for every row
    pub mean_off: f64,
    /// Mean prediction with the indicator set to 1 for every row
    pub mean_on: f64,
    /// `mean(y_on - y_off)`
    pub mean_difference: f64,
}

/// Predict every row twice, with `column` set to 0 and to 1.
pub fn counterfactual_effect(
    beta: &[f64],
    x: &DesignMatrix,
    column: &str,
) -> Result<CounterfactualEffect> {
    let idx = x.column_index(column).ok_or_else(|| {
        anyhow::anyhow!(
            "Counterfactual column '{}' is not in the design. Available: {:?}",
            column,
            x.names
        )
    })?;

    let off: Vec<f64> = x
        .with_column_set(idx, 0.0)
        .linear_predictor(beta)
        .iter()
        .map(|e| e.exp())
        .collect();
    let on: Vec<f64> = x
        .with_column_set(idx, 1.0)
        .linear_predictor(beta)
        .iter()
        .map(|e| e.exp())
        .collect();
    let diffs: Vec<f64> = on.iter().zip(&off).map(|(a, b)| a - b).collect();

    Ok(CounterfactualEffect {
        column: column.to_string(),
        mean_off: mean(&off),
        mean_on: mean(&on),
        mean_difference: mean(&diffs),
    })
}

/// Poisson regression posterior with independent zero-mean normal priors
pub struct PoissonPosterior<'a> {
    x: &'a DesignMatrix,
    y: &'a [f64],
    priors: Vec<Normal>,
}

impl<'a> PoissonPosterior<'a> {
    pub fn new(x: &'a DesignMatrix, y: &'a [f64], prior_sds: &[f64]) -> Result<Self> {
        check_inputs(x, y)?;
        if prior_sds.len() != x.ncols() {
            return Err(ModelError::DimensionMismatch {
                what: "prior standard deviations".to_string(),
                expected: x.ncols(),
                actual: prior_sds.len(),
            }
            .into());
        }
        let priors = prior_sds
            .iter()
            .map(|&sd| Normal::new(0.0, sd))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { x, y, priors })
    }
}

impl LogDensity for PoissonPosterior<'_> {
    fn dim(&self) -> usize {
        self.x.ncols()
    }

    fn log_density(&self, beta: &[f64]) -> f64 {
        let prior: f64 = beta
            .iter()
            .zip(&self.priors)
            .map(|(b, p)| p.ln_pdf(*b))
            .sum();
        poisson_regression_log_likelihood(beta, self.x, self.y) + prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_counts() {
        assert!(validate_counts(&[0.0, 1.0, 7.0]).is_ok());
        assert!(matches!(
            validate_counts(&[1.0, -2.0]),
            Err(ModelError::InvalidCount { row: 1, .. })
        ));
        assert!(validate_counts(&[1.5]).is_err());
        assert!(validate_counts(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_single_rate_log_likelihood() {
        // P(Y = 2 | lambda = 3) = 9 e^-3 / 2
        let expected = (9.0f64 * (-3.0f64).exp() / 2.0).ln();
        assert!((poisson_log_likelihood(3.0, &[2.0]) - expected).abs() < 1e-12);
        assert_eq!(poisson_log_likelihood(0.0, &[1.0]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_sample_mean_maximises_profile() {
        let y = [2.0, 4.0, 3.0, 5.0, 1.0, 3.0];
        let mle = lambda_mle(&y);
        let grid: Vec<f64> = (1..=60).map(|i| i as f64 * 0.1).collect();
        let profile = lambda_profile(&y, &grid);
        let (best, _) = profile
            .iter()
            .copied()
            .fold((0.0, f64::NEG_INFINITY), |acc, p| if p.1 > acc.1 { p } else { acc });
        assert!((best - mle).abs() < 0.05 + 1e-12);
    }

    #[test]
    fn test_deviance_zero_at_saturation() {
        let y = [0.0, 2.0, 5.0];
        assert!(poisson_deviance(&y, &[1e-300, 2.0, 5.0]).abs() < 1e-9);
    }

    #[test]
    fn test_counterfactual_unknown_column() {
        let x = DesignMatrix::from_columns(vec![("intercept".to_string(), vec![1.0, 1.0])])
            .unwrap();
        assert!(counterfactual_effect(&[0.0], &x, "treated").is_err());
    }
}
