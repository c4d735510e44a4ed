//! Random-walk Metropolis-Hastings sampling
//!
//! A single chain with independent normal proposals per coordinate. Every
//! step records the state the chain is in after the accept/reject decision,
//! so rejected proposals repeat the previous state. The first `burn_in`
//! states are discarded before summarising.

use anyhow::Result;
use indicatif::ProgressBar;
use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use super::error::ModelError;
use super::stats::{mean, quantile, std_dev};

/// An unnormalised log density (typically a log posterior).
pub trait LogDensity {
    /// Number of parameters
    fn dim(&self) -> usize;

    /// Log density at `theta`; `-inf` marks points outside the support
    fn log_density(&self, theta: &[f64]) -> f64;
}

/// Sampler configuration
#[derive(Debug, Clone, Serialize)]
pub struct MetropolisConfig {
    /// Total number of steps (all are recorded)
    pub steps: usize,
    /// Leading steps discarded before summarising
    pub burn_in: usize,
    /// Standard deviation of the normal proposal, one per parameter
    pub proposal_sd: Vec<f64>,
}

impl MetropolisConfig {
    pub fn new(proposal_sd: Vec<f64>) -> Self {
        Self {
            steps: 11_000,
            burn_in: 1_000,
            proposal_sd,
        }
    }

    /// Check the configuration against the target dimension.
    pub fn validate(&self, dim: usize) -> Result<(), ModelError> {
        if self.steps == 0 {
            return Err(ModelError::InvalidConfig("steps must be at least 1".to_string()));
        }
        if self.burn_in >= self.steps {
            return Err(ModelError::InvalidConfig(format!(
                "burn-in ({}) must be smaller than the number of steps ({})",
                self.burn_in, self.steps
            )));
        }
        if self.proposal_sd.len() != dim {
            return Err(ModelError::DimensionMismatch {
                what: "proposal standard deviations".to_string(),
                expected: dim,
                actual: self.proposal_sd.len(),
            });
        }
        if let Some(sd) = self
            .proposal_sd
            .iter()
            .find(|sd| !(sd.is_finite() && **sd > 0.0))
        {
            return Err(ModelError::InvalidConfig(format!(
                "proposal standard deviations must be positive and finite, got {}",
                sd
            )));
        }
        Ok(())
    }
}

/// Fate of a single proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Accepted,
    Rejected,
}

/// A recorded chain
#[derive(Debug, Clone, Serialize)]
pub struct Chain {
    /// State after each step (length = steps)
    pub draws: Vec<Vec<f64>>,
    /// Outcome of each step's proposal
    pub outcomes: Vec<StepOutcome>,
    pub burn_in: usize,
}

/// Posterior summary for one parameter
#[derive(Debug, Clone, Serialize)]
pub struct PosteriorSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    /// 2.5% quantile
    pub lower: f64,
    /// 97.5% quantile
    pub upper: f64,
}

impl Chain {
    /// Draws remaining after the burn-in prefix.
    pub fn retained(&self) -> &[Vec<f64>] {
        &self.draws[self.burn_in.min(self.draws.len())..]
    }

    /// Share of accepted proposals over the whole chain.
    pub fn acceptance_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let accepted = self
            .outcomes
            .iter()
            .filter(|o| **o == StepOutcome::Accepted)
            .count();
        accepted as f64 / self.outcomes.len() as f64
    }

    /// Full trace (burn-in included) of one parameter.
    pub fn trace(&self, param: usize) -> Vec<f64> {
        self.draws.iter().map(|d| d[param]).collect()
    }

    /// Mean, sd and 95% credible interval of each retained parameter.
    pub fn summarize(&self, names: &[String]) -> Vec<PosteriorSummary> {
        let retained = self.retained();
        names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let values: Vec<f64> = retained.iter().map(|d| d[j]).collect();
                PosteriorSummary {
                    name: name.clone(),
                    mean: mean(&values),
                    sd: std_dev(&values),
                    lower: quantile(&values, 0.025),
                    upper: quantile(&values, 0.975),
                }
            })
            .collect()
    }
}

/// Run a random-walk Metropolis-Hastings chain.
///
/// A proposal `theta' = theta + N(0, sd)` is accepted with probability
/// `min(1, exp(log p(theta') - log p(theta)))`. Proposals with a non-finite
/// log density are rejected.
pub fn metropolis_hastings<D, R>(
    target: &D,
    initial: &[f64],
    config: &MetropolisConfig,
    rng: &mut R,
    progress: Option<&ProgressBar>,
) -> Result<Chain>
where
    D: LogDensity + ?Sized,
    R: Rng,
{
    let dim = target.dim();
    config.validate(dim)?;
    if initial.len() != dim {
        return Err(ModelError::DimensionMismatch {
            what: "initial state".to_string(),
            expected: dim,
            actual: initial.len(),
        }
        .into());
    }

    let mut current = initial.to_vec();
    let mut current_lp = target.log_density(&current);
    if !current_lp.is_finite() {
        return Err(ModelError::NonFiniteObjective { value: current_lp }.into());
    }

    let proposals: Vec<Normal<f64>> = config
        .proposal_sd
        .iter()
        .map(|&sd| Normal::new(0.0, sd))
        .collect::<Result<_, _>>()?;

    let mut draws = Vec::with_capacity(config.steps);
    let mut outcomes = Vec::with_capacity(config.steps);

    for step in 0..config.steps {
        let candidate: Vec<f64> = current
            .iter()
            .zip(&proposals)
            .map(|(x, dist)| x + dist.sample(rng))
            .collect();

        let candidate_lp = target.log_density(&candidate);
        let log_ratio = candidate_lp - current_lp;
        let log_u: f64 = rng.gen::<f64>().ln();

        if candidate_lp.is_finite() && log_u < log_ratio.min(0.0) {
            current = candidate;
            current_lp = candidate_lp;
            outcomes.push(StepOutcome::Accepted);
        } else {
            outcomes.push(StepOutcome::Rejected);
        }
        draws.push(current.clone());

        if let Some(pb) = progress {
            if step % 100 == 0 {
                pb.set_position(step as u64);
            }
        }
    }

    let chain = Chain {
        draws,
        outcomes,
        burn_in: config.burn_in,
    };
    debug!(
        "Metropolis-Hastings: {} steps, acceptance rate {:.3}",
        config.steps,
        chain.acceptance_rate()
    );

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct StandardNormal2;

    impl LogDensity for StandardNormal2 {
        fn dim(&self) -> usize {
            2
        }

        fn log_density(&self, theta: &[f64]) -> f64 {
            -0.5 * theta.iter().map(|t| t * t).sum::<f64>()
        }
    }

    struct PositiveHalfLine;

    impl LogDensity for PositiveHalfLine {
        fn dim(&self) -> usize {
            1
        }

        fn log_density(&self, theta: &[f64]) -> f64 {
            if theta[0] <= 0.0 {
                f64::NEG_INFINITY
            } else {
                -theta[0]
            }
        }
    }

    #[test]
    fn test_chain_records_every_step() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = MetropolisConfig {
            steps: 500,
            burn_in: 100,
            proposal_sd: vec![1.0, 1.0],
        };
        let chain =
            metropolis_hastings(&StandardNormal2, &[0.0, 0.0], &config, &mut rng, None).unwrap();
        assert_eq!(chain.draws.len(), 500);
        assert_eq!(chain.outcomes.len(), 500);
        assert_eq!(chain.retained().len(), 400);
    }

    #[test]
    fn test_rejected_steps_repeat_previous_state() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = MetropolisConfig {
            steps: 300,
            burn_in: 0,
            proposal_sd: vec![3.0, 3.0],
        };
        let chain =
            metropolis_hastings(&StandardNormal2, &[0.0, 0.0], &config, &mut rng, None).unwrap();
        for i in 1..chain.draws.len() {
            if chain.outcomes[i] == StepOutcome::Rejected {
                assert_eq!(chain.draws[i], chain.draws[i - 1]);
            }
        }
        assert!(chain.acceptance_rate() > 0.0 && chain.acceptance_rate() < 1.0);
    }

    #[test]
    fn test_never_leaves_support() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = MetropolisConfig {
            steps: 2_000,
            burn_in: 0,
            proposal_sd: vec![2.0],
        };
        let chain = metropolis_hastings(&PositiveHalfLine, &[1.0], &config, &mut rng, None).unwrap();
        assert!(chain.draws.iter().all(|d| d[0] > 0.0));
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = MetropolisConfig {
            steps: 40_000,
            burn_in: 2_000,
            proposal_sd: vec![1.0, 1.0],
        };
        let chain =
            metropolis_hastings(&StandardNormal2, &[3.0, -3.0], &config, &mut rng, None).unwrap();
        let summary = chain.summarize(&["a".to_string(), "b".to_string()]);
        for s in &summary {
            assert!(s.mean.abs() < 0.15, "{} mean {}", s.name, s.mean);
            assert!((s.sd - 1.0).abs() < 0.15, "{} sd {}", s.name, s.sd);
            assert!(s.lower < s.mean && s.mean < s.upper);
        }
    }

    #[test]
    fn test_invalid_burn_in() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = MetropolisConfig {
            steps: 10,
            burn_in: 10,
            proposal_sd: vec![1.0, 1.0],
        };
        let result = metropolis_hastings(&StandardNormal2, &[0.0, 0.0], &config, &mut rng, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_finite_start_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = MetropolisConfig {
            steps: 10,
            burn_in: 0,
            proposal_sd: vec![1.0],
        };
        let result = metropolis_hastings(&PositiveHalfLine, &[-1.0], &config, &mut rng, None);
        assert!(result.is_err());
    }
}
