//! Integration tests for the Metropolis-Hastings sampler

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statlab::pipeline::{
    build_design_matrix, column_as_f64, fit_poisson_mle, metropolis_hastings, BfgsConfig, Chain,
    DesignSpec, LogDensity, MetropolisConfig, ModelError, PoissonPosterior, StepOutcome,
};

mod common;

/// Independent normals with the given means and unit variance
struct StandardNormal {
    means: Vec<f64>,
}

impl LogDensity for StandardNormal {
    fn dim(&self) -> usize {
        self.means.len()
    }

    fn log_density(&self, x: &[f64]) -> f64 {
        x.iter()
            .zip(&self.means)
            .map(|(v, m)| -0.5 * (v - m).powi(2))
            .sum()
    }
}

/// Uniform on [0, 1]: `-inf` outside
struct UnitInterval;

impl LogDensity for UnitInterval {
    fn dim(&self) -> usize {
        1
    }

    fn log_density(&self, x: &[f64]) -> f64 {
        if (0.0..=1.0).contains(&x[0]) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}

fn config(steps: usize, burn_in: usize, sd: Vec<f64>) -> MetropolisConfig {
    let mut config = MetropolisConfig::new(sd);
    config.steps = steps;
    config.burn_in = burn_in;
    config
}

#[test]
fn test_chain_records_every_step() {
    let target = StandardNormal { means: vec![0.0] };
    let mut rng = StdRng::seed_from_u64(1);
    let chain = metropolis_hastings(&target, &[0.0], &config(500, 100, vec![1.0]), &mut rng, None)
        .unwrap();

    assert_eq!(chain.draws.len(), 500);
    assert_eq!(chain.outcomes.len(), 500);
    assert_eq!(chain.retained().len(), 400);

    // a rejected step repeats the previous state
    for i in 1..chain.draws.len() {
        if chain.outcomes[i] == StepOutcome::Rejected {
            assert_eq!(chain.draws[i], chain.draws[i - 1]);
        }
    }
}

#[test]
fn test_recovers_normal_moments() {
    let target = StandardNormal {
        means: vec![2.0, -1.0],
    };
    let mut rng = StdRng::seed_from_u64(42);
    let chain = metropolis_hastings(
        &target,
        &[0.0, 0.0],
        &config(40_000, 2_000, vec![1.5, 1.5]),
        &mut rng,
        None,
    )
    .unwrap();

    let names = vec!["a".to_string(), "b".to_string()];
    let summary = chain.summarize(&names);
    assert!((summary[0].mean - 2.0).abs() < 0.1, "mean a = {}", summary[0].mean);
    assert!((summary[1].mean + 1.0).abs() < 0.1, "mean b = {}", summary[1].mean);
    assert!((summary[0].sd - 1.0).abs() < 0.1, "sd a = {}", summary[0].sd);
    assert!(summary[0].lower < 2.0 && summary[0].upper > 2.0);

    let rate = chain.acceptance_rate();
    assert!(rate > 0.2 && rate < 0.8, "acceptance rate {}", rate);
}

#[test]
fn test_never_leaves_support() {
    let mut rng = StdRng::seed_from_u64(7);
    let chain = metropolis_hastings(
        &UnitInterval,
        &[0.5],
        &config(2_000, 0, vec![0.8]),
        &mut rng,
        None,
    )
    .unwrap();
    assert!(chain.trace(0).iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(chain.acceptance_rate() < 1.0);
}

#[test]
fn test_invalid_start_and_config() {
    let mut rng = StdRng::seed_from_u64(0);

    let err = metropolis_hastings(&UnitInterval, &[2.0], &config(10, 0, vec![0.1]), &mut rng, None)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ModelError>(),
        Some(ModelError::NonFiniteObjective { .. })
    ));

    assert!(config(10, 10, vec![0.1]).validate(1).is_err());
    assert!(config(10, 0, vec![0.1, 0.1]).validate(1).is_err());
    assert!(config(10, 0, vec![0.0]).validate(1).is_err());
    assert!(config(10, 0, vec![f64::NAN]).validate(1).is_err());
    assert!(config(10, 9, vec![0.1]).validate(1).is_ok());
}

#[test]
fn test_same_seed_same_chain() {
    let target = StandardNormal { means: vec![0.0] };
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        metropolis_hastings(&target, &[0.0], &config(300, 50, vec![0.5]), &mut rng, None)
            .unwrap()
            .draws
    };
    assert_eq!(run(11), run(11));
    assert_ne!(run(11), run(12));
}

#[test]
fn test_poisson_posterior_centres_on_mle() {
    let df = common::create_poisson_dataframe(500, 21);
    let spec = DesignSpec {
        numeric: vec!["x".to_string()],
        intercept: true,
        ..Default::default()
    };
    let x = build_design_matrix(&df, &spec).unwrap();
    let y = column_as_f64(&df, "y").unwrap();
    let fit = fit_poisson_mle(&x, &y, &BfgsConfig::default()).unwrap();

    // vague priors: the posterior mean sits near the MLE
    let posterior = PoissonPosterior::new(&x, &y, &[10.0, 10.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let chain: Chain = metropolis_hastings(
        &posterior,
        &fit.estimates,
        &config(12_000, 2_000, fit.std_errors.clone()),
        &mut rng,
        None,
    )
    .unwrap();

    let summary = chain.summarize(&x.names);
    for (s, (est, se)) in summary.iter().zip(fit.estimates.iter().zip(&fit.std_errors)) {
        assert!(
            (s.mean - est).abs() < 0.5 * se,
            "{}: posterior mean {} vs MLE {}",
            s.name,
            s.mean,
            est
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_summary_mean_inside_interval(seed in 0u64..10_000, sd in 0.1f64..3.0) {
        let target = StandardNormal { means: vec![0.0] };
        let mut rng = StdRng::seed_from_u64(seed);
        let chain = metropolis_hastings(&target, &[0.0], &config(600, 100, vec![sd]), &mut rng, None)
            .unwrap();
        let summary = chain.summarize(&["theta".to_string()]);

        prop_assert!(summary[0].lower <= summary[0].mean);
        prop_assert!(summary[0].mean <= summary[0].upper);
        prop_assert!(summary[0].sd >= 0.0);
        let rate = chain.acceptance_rate();
        prop_assert!((0.0..=1.0).contains(&rate));
    }
}
