//! Integration tests for k-nearest-neighbour classification

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statlab::pipeline::{
    accuracy_curve, best_k, knn_accuracy, knn_predict, simulate_boundary_data,
    AccuracyPoint, KnnDataset, ModelError,
};

fn line_dataset() -> KnnDataset {
    KnnDataset {
        features: vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0], vec![11.0]],
        labels: vec![0, 0, 0, 1, 1],
    }
}

#[test]
fn test_predict_majority_vote() {
    let train = line_dataset();
    assert_eq!(knn_predict(&train, &[0.4], 1).unwrap(), 0);
    assert_eq!(knn_predict(&train, &[10.6], 1).unwrap(), 1);
    assert_eq!(knn_predict(&train, &[9.0], 3).unwrap(), 1);
    // all five points: three zeros beat two ones
    assert_eq!(knn_predict(&train, &[10.5], 5).unwrap(), 0);
}

#[test]
fn test_vote_tie_goes_to_nearest_label() {
    let train = line_dataset();
    // neighbours by distance: 10 (1), 2 (0), 11 (1), 1 (0)
    assert_eq!(knn_predict(&train, &[6.5], 4).unwrap(), 1);
    // neighbours: 2 (0) at 3.8, 10 (1) at 4.2
    assert_eq!(knn_predict(&train, &[5.8], 2).unwrap(), 0);
}

#[test]
fn test_invalid_k() {
    let train = line_dataset();
    assert!(matches!(
        knn_predict(&train, &[0.0], 0),
        Err(ModelError::InvalidConfig(_))
    ));
    assert!(knn_predict(&train, &[0.0], 6).is_err());
}

#[test]
fn test_boundary_data_labels_follow_curve() {
    let mut rng = StdRng::seed_from_u64(2024);
    let data = simulate_boundary_data(200, &mut rng);
    assert_eq!(data.len(), 200);

    for (p, &label) in data.features.iter().zip(&data.labels) {
        assert!((-3.0..=3.0).contains(&p[0]) && (-3.0..=3.0).contains(&p[1]));
        let above = p[1] > (4.0 * p[0]).sin() + p[0];
        assert_eq!(label, i64::from(above));
    }
}

#[test]
fn test_accuracy_curve_on_boundary_data() {
    let train = simulate_boundary_data(300, &mut StdRng::seed_from_u64(42));
    let test = simulate_boundary_data(200, &mut StdRng::seed_from_u64(2025));

    let curve = accuracy_curve(&train, &test, 15).unwrap();
    assert_eq!(curve.len(), 15);
    assert!(curve.iter().enumerate().all(|(i, p)| p.k == i + 1));
    assert!(curve.iter().all(|p| (0.0..=1.0).contains(&p.accuracy)));

    let best = best_k(&curve).unwrap();
    assert!(best.accuracy > 0.75, "best accuracy {}", best.accuracy);
    assert_eq!(best.accuracy, knn_accuracy(&train, &test, best.k).unwrap());
}

#[test]
fn test_best_k_prefers_smallest() {
    let curve = vec![
        AccuracyPoint { k: 1, accuracy: 0.7 },
        AccuracyPoint { k: 2, accuracy: 0.9 },
        AccuracyPoint { k: 3, accuracy: 0.9 },
        AccuracyPoint { k: 4, accuracy: 0.8 },
    ];
    assert_eq!(best_k(&curve).unwrap().k, 2);
    assert!(best_k(&[]).is_none());
}

#[test]
fn test_from_dataframe_and_split() {
    let df = df! {
        "a" => [0.0f64, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        "b" => [1.0f64; 10],
        "label" => [0i64, 0, 0, 0, 0, 1, 1, 1, 1, 1],
    }
    .unwrap();
    let data = KnnDataset::from_dataframe(&df, &["a".to_string(), "b".to_string()], "label")
        .unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data.features[3], vec![3.0, 1.0]);

    let (train, test) = data.train_test_split(0.7, &mut StdRng::seed_from_u64(0));
    assert_eq!(train.len(), 7);
    assert_eq!(test.len(), 3);

    let mut all: Vec<i64> = train.labels.iter().chain(&test.labels).copied().collect();
    all.sort_unstable();
    assert_eq!(all, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
}

#[test]
fn test_fractional_labels_rejected() {
    let df = df! {
        "a" => [0.0f64, 1.0],
        "label" => [0.0f64, 0.5],
    }
    .unwrap();
    let err = KnnDataset::from_dataframe(&df, &["a".to_string()], "label").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ModelError>(),
        Some(ModelError::InvalidLabel { row: 1, .. })
    ));
}
