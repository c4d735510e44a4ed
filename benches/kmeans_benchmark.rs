//! Benchmarks for k-means clustering and k-NN classification
//!
//! Run with: cargo bench --bench kmeans_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use statlab::pipeline::{
    accuracy_curve, evaluate_k_range, kmeans, simulate_boundary_data, KMeansConfig,
};

/// Points scattered around `k` centres on a circle
fn generate_blobs(n: usize, k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let angle = (i % k) as f64 * std::f64::consts::TAU / k as f64;
            vec![
                10.0 * angle.cos() + rng.gen_range(-1.0..1.0),
                10.0 * angle.sin() + rng.gen_range(-1.0..1.0),
            ]
        })
        .collect()
}

fn benchmark_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans");

    for n in [1_000, 10_000] {
        let points = generate_blobs(n, 4, 42);
        let config = KMeansConfig {
            k: 4,
            ..Default::default()
        };
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(3);
                kmeans(black_box(&points), &config, &mut rng)
            })
        });
    }

    group.finish();
}

/// The silhouette is quadratic in the number of points
fn benchmark_k_range(c: &mut Criterion) {
    let points = generate_blobs(500, 4, 11);
    let ks: Vec<usize> = (2..=7).collect();

    c.bench_function("evaluate_k_range_500", |b| {
        b.iter(|| evaluate_k_range(black_box(&points), &ks, &KMeansConfig::default(), 42))
    });
}

fn benchmark_knn(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_accuracy_curve");
    group.sample_size(20);

    for n in [100, 1_000] {
        let train = simulate_boundary_data(n, &mut StdRng::seed_from_u64(42));
        let test = simulate_boundary_data(n, &mut StdRng::seed_from_u64(2025));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| accuracy_curve(black_box(&train), black_box(&test), 30))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_kmeans, benchmark_k_range, benchmark_knn);
criterion_main!(benches);
