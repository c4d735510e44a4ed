//! k-nearest-neighbour classification

use std::collections::HashMap;

use anyhow::Result;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;

use super::encoding::column_as_f64;
use super::error::ModelError;

/// Labelled points for classification
#[derive(Debug, Clone, Default)]
pub struct KnnDataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<i64>,
}

/// Test accuracy for one value of k
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AccuracyPoint {
    pub k: usize,
    pub accuracy: f64,
}

impl KnnDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Read feature columns and an integer-valued label column.
    pub fn from_dataframe(df: &DataFrame, features: &[String], target: &str) -> Result<Self> {
        if features.is_empty() {
            return Err(
                ModelError::InvalidConfig("at least one feature is required".to_string()).into(),
            );
        }

        let columns = features
            .iter()
            .map(|name| column_as_f64(df, name))
            .collect::<Result<Vec<_>>>()?;

        let labels = column_as_f64(df, target)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                if v.fract() == 0.0 && v.is_finite() {
                    Ok(v as i64)
                } else {
                    Err(ModelError::InvalidLabel {
                        column: target.to_string(),
                        row,
                        value: v,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let features = (0..df.height())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();

        Ok(Self { features, labels })
    }

    /// Shuffle and split into train and test sets, `train_frac` going to train.
    pub fn train_test_split<R: Rng>(&self, train_frac: f64, rng: &mut R) -> (Self, Self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        let cut = ((self.len() as f64) * train_frac).round() as usize;
        let pick = |idx: &[usize]| Self {
            features: idx.iter().map(|&i| self.features[i].clone()).collect(),
            labels: idx.iter().map(|&i| self.labels[i]).collect(),
        };
        (pick(&order[..cut.min(order.len())]), pick(&order[cut.min(order.len())..]))
    }
}

/// Points uniform on `[-3, 3]^2` labelled by whether they lie above the
/// curve `x2 = sin(4 x1) + x1`.
pub fn simulate_boundary_data<R: Rng>(n: usize, rng: &mut R) -> KnnDataset {
    let mut features = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let x1: f64 = rng.gen_range(-3.0..3.0);
        let x2: f64 = rng.gen_range(-3.0..3.0);
        let boundary = (4.0 * x1).sin() + x1;
        features.push(vec![x1, x2]);
        labels.push(i64::from(x2 > boundary));
    }
    KnnDataset { features, labels }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Predict the label of `query` by majority vote of its `k` nearest
/// training points.
///
/// Ties in the vote go to the tied label whose closest member is nearest
/// the query.
pub fn knn_predict(train: &KnnDataset, query: &[f64], k: usize) -> Result<i64, ModelError> {
    if k == 0 || k > train.len() {
        return Err(ModelError::InvalidConfig(format!(
            "k must be between 1 and the training size ({}), got {}",
            train.len(),
            k
        )));
    }

    let mut neighbours: Vec<(f64, i64)> = train
        .features
        .iter()
        .zip(&train.labels)
        .map(|(p, &label)| (distance(p, query), label))
        .collect();
    neighbours.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // label -> (votes, rank of closest member)
    let mut tally: HashMap<i64, (usize, usize)> = HashMap::new();
    for (rank, (_, label)) in neighbours.iter().take(k).enumerate() {
        let entry = tally.entry(*label).or_insert((0, rank));
        entry.0 += 1;
    }

    tally
        .into_iter()
        .max_by(|(_, (va, ra)), (_, (vb, rb))| va.cmp(vb).then(rb.cmp(ra)))
        .map(|(label, _)| label)
        .ok_or_else(|| ModelError::InvalidConfig("empty training set".to_string()))
}

/// Share of `test` points whose predicted label matches the truth.
pub fn knn_accuracy(train: &KnnDataset, test: &KnnDataset, k: usize) -> Result<f64> {
    if test.is_empty() {
        return Err(ModelError::InvalidConfig("test set is empty".to_string()).into());
    }
    let correct = test
        .features
        .par_iter()
        .zip(test.labels.par_iter())
        .map(|(x, &y)| knn_predict(train, x, k).map(|pred| usize::from(pred == y)))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sum::<usize>();
    Ok(correct as f64 / test.len() as f64)
}

/// Test accuracy for every k in `1..=k_max`.
pub fn accuracy_curve(train: &KnnDataset, test: &KnnDataset, k_max: usize) -> Result<Vec<AccuracyPoint>> {
    (1..=k_max)
        .into_par_iter()
        .map(|k| {
            Ok(AccuracyPoint {
                k,
                accuracy: knn_accuracy(train, test, k)?,
            })
        })
        .collect()
}

/// Smallest k achieving the highest accuracy.
pub fn best_k(curve: &[AccuracyPoint]) -> Option<AccuracyPoint> {
    curve.iter().copied().fold(None, |best, point| match best {
        Some(b) if b.accuracy >= point.accuracy => Some(b),
        _ => Some(point),
    })
}
