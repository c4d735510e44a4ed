//! Quasi-Newton optimisation and maximum-likelihood fitting
//!
//! This module minimises smooth objectives with argmin's BFGS and turns the
//! minimiser of a negative log-likelihood into a fitted model with a
//! Hessian-based covariance matrix.

mod bfgs;
mod numdiff;

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use super::error::ModelError;
use super::linalg::invert_spd_rows;
use super::stats::normal_quantile;

pub use bfgs::minimize_bfgs;
pub use numdiff::{numerical_gradient, numerical_hessian};

/// A smooth scalar function to minimise.
pub trait Objective {
    /// Number of parameters
    fn dim(&self) -> usize;

    /// Objective value at `x`
    fn value(&self, x: &[f64]) -> f64;

    /// Gradient at `x`. Defaults to central finite differences.
    fn gradient(&self, x: &[f64]) -> Vec<f64> {
        numerical_gradient(|p| self.value(p), x)
    }
}

/// Configuration for the BFGS minimiser
#[derive(Debug, Clone, Serialize)]
pub struct BfgsConfig {
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Stop when the relative change of the objective falls below this
    pub rel_tol: f64,
    /// Stop when the largest absolute gradient component falls below this
    pub grad_tol: f64,
}

impl Default for BfgsConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            rel_tol: 1e-8,
            grad_tol: 1e-6,
        }
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone, Serialize)]
pub struct OptimResult {
    /// Minimiser
    pub x: Vec<f64>,
    /// Objective value at the minimiser
    pub value: f64,
    /// Gradient at the minimiser
    pub gradient: Vec<f64>,
    /// Iterations performed
    pub iterations: usize,
    /// Whether a convergence criterion was met before `max_iter`
    pub converged: bool,
}

/// A maximum-likelihood fit with Hessian-based standard errors
#[derive(Debug, Clone, Serialize)]
pub struct MleFit {
    pub names: Vec<String>,
    pub estimates: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// Inverse of the Hessian of the negative log-likelihood
    pub covariance: Vec<Vec<f64>>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl MleFit {
    /// Wald intervals `estimate +/- z * se` at the given confidence level.
    pub fn confidence_intervals(&self, level: f64) -> Result<Vec<(f64, f64)>> {
        let z = normal_quantile(level)?;
        Ok(self
            .estimates
            .iter()
            .zip(&self.std_errors)
            .map(|(est, se)| (est - z * se, est + z * se))
            .collect())
    }

    /// Wald z statistics.
    pub fn z_values(&self) -> Vec<f64> {
        self.estimates
            .iter()
            .zip(&self.std_errors)
            .map(|(est, se)| est / se)
            .collect()
    }

    /// Two-sided p-values of the Wald statistics.
    pub fn p_values(&self) -> Result<Vec<f64>> {
        let normal = Normal::new(0.0, 1.0)?;
        Ok(self
            .z_values()
            .iter()
            .map(|z| 2.0 * (1.0 - normal.cdf(z.abs())))
            .collect())
    }

    /// Estimate for a named parameter.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.estimates[i])
    }

    /// Akaike information criterion.
    pub fn aic(&self) -> f64 {
        2.0 * self.estimates.len() as f64 - 2.0 * self.log_likelihood
    }
}

/// Fit a model by minimising its negative log-likelihood.
///
/// The covariance is the inverse of the numerically differentiated Hessian
/// at the optimum. A Hessian that is not positive definite is an error.
pub fn fit_mle<O: Objective>(
    nll: &O,
    names: Vec<String>,
    x0: &[f64],
    config: &BfgsConfig,
) -> Result<MleFit> {
    if names.len() != nll.dim() || x0.len() != nll.dim() {
        return Err(ModelError::DimensionMismatch {
            what: "parameter names / starting values".to_string(),
            expected: nll.dim(),
            actual: names.len().min(x0.len()),
        }
        .into());
    }

    let result = minimize_bfgs(nll, x0, config)?;
    if !result.converged {
        warn!(
            "Optimiser stopped after {} iterations without meeting the tolerance",
            result.iterations
        );
    }

    let hessian = numerical_hessian(nll, &result.x);
    let covariance = invert_spd_rows(&hessian).ok_or(ModelError::SingularHessian)?;
    let std_errors: Vec<f64> = (0..covariance.len())
        .map(|i| covariance[i][i].sqrt())
        .collect();

    debug!(
        "MLE converged={} after {} iterations, log-likelihood {:.4}",
        result.converged, result.iterations, -result.value
    );

    Ok(MleFit {
        names,
        estimates: result.x,
        std_errors,
        covariance,
        log_likelihood: -result.value,
        iterations: result.iterations,
        converged: result.converged,
    })
}
