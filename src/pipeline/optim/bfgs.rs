//! BFGS through argmin with a backtracking Armijo line search

use anyhow::Result;
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::BacktrackingLineSearch;
use argmin::solver::quasinewton::BFGS;
use log::debug;

use super::super::error::ModelError;
use super::{BfgsConfig, Objective, OptimResult};

/// Sufficient-decrease constant of the Armijo condition
const ARMIJO_C1: f64 = 1e-4;

/// Step shrink factor while backtracking
const BACKTRACK: f64 = 0.5;

type ArmijoSearch = BacktrackingLineSearch<Vec<f64>, Vec<f64>, ArmijoCondition<f64>, f64>;

/// An [`Objective`] seen through argmin's problem traits
struct Problem<'a, O> {
    objective: &'a O,
}

impl<O: Objective> CostFunction for Problem<'_, O> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, ArgminError> {
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteParameters.into());
        }
        let value = self.objective.value(x);
        // trial points outside the domain are backtracked
        Ok(if value.is_nan() { f64::INFINITY } else { value })
    }
}

impl<O: Objective> Gradient for Problem<'_, O> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        Ok(self.objective.gradient(x))
    }
}

fn identity(p: usize) -> Vec<Vec<f64>> {
    (0..p)
        .map(|i| (0..p).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Minimise `objective` starting from `x0`.
///
/// The inverse Hessian starts at the identity. argmin stops on the gradient
/// norm, on an objective change below `rel_tol` scaled by the starting value,
/// or at `max_iter`. A stop on the objective change only counts as
/// convergence when the final step actually moved the parameters.
pub fn minimize_bfgs<O: Objective>(
    objective: &O,
    x0: &[f64],
    config: &BfgsConfig,
) -> Result<OptimResult> {
    if x0.len() != objective.dim() {
        return Err(ModelError::DimensionMismatch {
            what: "starting values".to_string(),
            expected: objective.dim(),
            actual: x0.len(),
        }
        .into());
    }
    if config.max_iter == 0 {
        return Err(ModelError::InvalidConfig("max_iter must be at least 1".to_string()).into());
    }

    let f0 = objective.value(x0);
    if !f0.is_finite() {
        return Err(ModelError::NonFiniteObjective { value: f0 }.into());
    }

    let linesearch: ArmijoSearch =
        BacktrackingLineSearch::new(ArmijoCondition::new(ARMIJO_C1)?).rho(BACKTRACK)?;
    let solver = BFGS::new(linesearch)
        .with_tolerance_grad(config.grad_tol)?
        .with_tolerance_cost(config.rel_tol * (f0.abs() + config.rel_tol))?;

    let p = x0.len();
    let result = Executor::new(Problem { objective }, solver)
        .configure(|state| {
            state
                .param(x0.to_vec())
                .inv_hessian(identity(p))
                .max_iters(config.max_iter as u64)
        })
        .run()?;

    let state = result.state();
    let iterations = state.get_iter() as usize;
    let x = state
        .get_best_param()
        .cloned()
        .unwrap_or_else(|| x0.to_vec());
    let value = objective.value(&x);
    let gradient = objective.gradient(&x);

    let moved = match (state.get_param(), state.get_prev_param()) {
        (Some(current), Some(previous)) => current != previous,
        _ => false,
    };
    let solver_converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let converged = solver_converged && (moved || max_abs(&gradient) < config.grad_tol);

    debug!(
        "BFGS stopped after {} iterations ({:?}), f = {:.8}",
        iterations,
        state.get_termination_status(),
        value
    );

    Ok(OptimResult {
        x,
        value,
        gradient,
        iterations,
        converged,
    })
}
