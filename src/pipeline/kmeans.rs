//! K-means clustering (Lloyd's algorithm) and cluster-quality measures

use anyhow::Result;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use super::error::ModelError;
use super::stats::{mean, std_dev};

/// K-means settings
#[derive(Debug, Clone, Serialize)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iter: usize,
    /// Stop once no centroid moves further than this (Euclidean)
    pub tol: f64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

/// Result of one k-means run
#[derive(Debug, Clone, Serialize)]
pub struct KMeansResult {
    pub centroids: Vec<Vec<f64>>,
    /// Cluster index of each point
    pub labels: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
    /// Within-cluster sum of squares
    pub wcss: f64,
    /// Centroids at the start and after every iteration
    pub history: Vec<Vec<Vec<f64>>>,
}

/// Per-k quality measures for elbow and silhouette plots
#[derive(Debug, Clone, Serialize)]
pub struct KEvaluation {
    pub k: usize,
    pub wcss: f64,
    pub silhouette: f64,
}

#[inline]
fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn check_points(points: &[Vec<f64>]) -> Result<usize, ModelError> {
    let dim = points.first().map(|p| p.len()).unwrap_or(0);
    if dim == 0 {
        return Err(ModelError::InvalidConfig(
            "k-means needs at least one point with at least one feature".to_string(),
        ));
    }
    if let Some(bad) = points.iter().find(|p| p.len() != dim) {
        return Err(ModelError::DimensionMismatch {
            what: "point dimension".to_string(),
            expected: dim,
            actual: bad.len(),
        });
    }
    Ok(dim)
}

/// Cluster `points` into `config.k` groups.
///
/// Initial centroids are `k` distinct points drawn at random. A cluster that
/// loses all its points keeps its previous centroid.
pub fn kmeans<R: Rng>(
    points: &[Vec<f64>],
    config: &KMeansConfig,
    rng: &mut R,
) -> Result<KMeansResult> {
    let dim = check_points(points)?;
    let n = points.len();
    if config.k == 0 || config.k > n {
        return Err(ModelError::InvalidConfig(format!(
            "k must be between 1 and the number of points ({}), got {}",
            n, config.k
        ))
        .into());
    }

    let mut centroids: Vec<Vec<f64>> = sample(rng, n, config.k)
        .into_iter()
        .map(|i| points[i].clone())
        .collect();
    let mut history = vec![centroids.clone()];
    let mut labels = vec![0usize; n];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iter {
        iterations += 1;

        labels = points
            .par_iter()
            .map(|p| nearest_centroid(p, &centroids))
            .collect();

        let mut sums = vec![vec![0.0; dim]; config.k];
        let mut counts = vec![0usize; config.k];
        for (p, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (s, v) in sums[label].iter_mut().zip(p) {
                *s += v;
            }
        }

        let updated: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .zip(&centroids)
            .map(|((sum, &count), previous)| {
                if count == 0 {
                    previous.clone()
                } else {
                    sum.into_iter().map(|s| s / count as f64).collect()
                }
            })
            .collect();

        let max_shift = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| squared_distance(a, b).sqrt())
            .fold(0.0, f64::max);

        centroids = updated;
        history.push(centroids.clone());

        if max_shift <= config.tol {
            converged = true;
            break;
        }
    }

    // Final assignment against the final centroids
    labels = points
        .par_iter()
        .map(|p| nearest_centroid(p, &centroids))
        .collect();
    let wcss = within_cluster_ss(points, &labels, &centroids);

    debug!(
        "k-means k={} finished after {} iterations (converged={}), WCSS {:.4}",
        config.k, iterations, converged, wcss
    );

    Ok(KMeansResult {
        centroids,
        labels,
        iterations,
        converged,
        wcss,
        history,
    })
}

/// Sum of squared distances from each point to its cluster centroid.
pub fn within_cluster_ss(points: &[Vec<f64>], labels: &[usize], centroids: &[Vec<f64>]) -> f64 {
    points
        .iter()
        .zip(labels)
        .map(|(p, &l)| squared_distance(p, &centroids[l]))
        .sum()
}

/// Mean silhouette width over all points.
///
/// `s(i) = (b - a) / max(a, b)` with `a` the mean distance to the point's own
/// cluster and `b` the smallest mean distance to another cluster. Points in
/// singleton clusters score 0. Fewer than two clusters gives 0.
pub fn silhouette_score(points: &[Vec<f64>], labels: &[usize]) -> f64 {
    let k = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    if k < 2 || points.len() != labels.len() {
        return 0.0;
    }

    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let scores: Vec<f64> = points
        .par_iter()
        .zip(labels.par_iter())
        .map(|(p, &own)| {
            if sizes[own] <= 1 {
                return 0.0;
            }

            let mut totals = vec![0.0; k];
            for (q, &l) in points.iter().zip(labels) {
                totals[l] += squared_distance(p, q).sqrt();
            }

            let a = totals[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| totals[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    mean(&scores)
}

/// Z-score every feature (mean 0, sample sd 1). Constant features become 0.
pub fn standardize(points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = points.first().map(|p| p.len()).unwrap_or(0);
    let stats: Vec<(f64, f64)> = (0..dim)
        .map(|j| {
            let column: Vec<f64> = points.iter().map(|p| p[j]).collect();
            (mean(&column), std_dev(&column))
        })
        .collect();

    points
        .iter()
        .map(|p| {
            p.iter()
                .zip(&stats)
                .map(|(v, (m, s))| if *s > 0.0 { (v - m) / s } else { 0.0 })
                .collect()
        })
        .collect()
}

/// Run k-means for every `k` in `ks` and report WCSS and silhouette.
///
/// Each k gets its own RNG seeded from `seed + k` so results do not depend on
/// evaluation order.
pub fn evaluate_k_range(
    points: &[Vec<f64>],
    ks: &[usize],
    template: &KMeansConfig,
    seed: u64,
) -> Result<Vec<KEvaluation>> {
    ks.par_iter()
        .map(|&k| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
            let config = KMeansConfig {
                k,
                ..template.clone()
            };
            let result = kmeans(points, &config, &mut rng)?;
            Ok(KEvaluation {
                k,
                wcss: result.wcss,
                silhouette: silhouette_score(points, &result.labels),
            })
        })
        .collect()
}
