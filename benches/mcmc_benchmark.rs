//! Benchmarks for the likelihood fits and the Metropolis-Hastings sampler
//!
//! Run with: cargo bench --bench mcmc_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;
use rand_distr::Poisson;

use statlab::pipeline::{
    fit_poisson_glm, fit_poisson_mle, metropolis_hastings, BfgsConfig, DesignMatrix, IrlsConfig,
    MetropolisConfig, PoissonPosterior,
};

/// Intercept plus one uniform covariate, counts from `exp(0.5 + 0.3 x)`
fn generate_counts(n: usize, seed: u64) -> (DesignMatrix, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..2.0)).collect();
    let y: Vec<f64> = x
        .iter()
        .map(|xi| {
            let mu: f64 = (0.5 + 0.3 * xi).exp();
            Poisson::new(mu).map(|d| d.sample(&mut rng)).unwrap_or(0.0)
        })
        .collect();

    let design = DesignMatrix::from_columns(vec![
        ("intercept".to_string(), vec![1.0; n]),
        ("x".to_string(), x),
    ])
    .expect("Failed to build design matrix");
    (design, y)
}

/// BFGS on the negative log-likelihood against IRLS
fn benchmark_poisson_fits(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson_fit");

    for n in [500, 5_000] {
        let (x, y) = generate_counts(n, 42);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("bfgs", n), &n, |b, _| {
            b.iter(|| fit_poisson_mle(black_box(&x), black_box(&y), &BfgsConfig::default()))
        });
        group.bench_with_input(BenchmarkId::new("irls", n), &n, |b, _| {
            b.iter(|| fit_poisson_glm(black_box(&x), black_box(&y), &IrlsConfig::default()))
        });
    }

    group.finish();
}

/// Sampler cost per step grows with the number of rows in the likelihood
fn benchmark_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("metropolis_hastings");
    group.sample_size(10);

    for n in [200, 2_000] {
        let (x, y) = generate_counts(n, 7);
        let posterior = PoissonPosterior::new(&x, &y, &[5.0, 5.0]).expect("valid posterior");
        let mut config = MetropolisConfig::new(vec![0.05, 0.05]);
        config.steps = 2_000;
        config.burn_in = 200;

        group.throughput(Throughput::Elements(config.steps as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(1);
                metropolis_hastings(&posterior, &[0.5, 0.3], &config, &mut rng, None)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_poisson_fits, benchmark_sampler);
criterion_main!(benches);
