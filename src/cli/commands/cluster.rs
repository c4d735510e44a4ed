//! `kmeans` and `knn`

use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{load_input, series, RunContext};
use crate::cli::args::{KmeansArgs, KnnArgs};
use crate::pipeline::{
    accuracy_curve, best_k, column_as_f64, evaluate_k_range, kmeans, require_columns,
    simulate_boundary_data, standardize, KMeansConfig, KnnDataset,
};
use crate::report::{
    display_accuracy_table, display_centroids, display_k_evaluation, print_sparkline,
};
use crate::utils::{
    create_spinner, finish_with_success, print_config, print_count, print_info,
    print_step_header, print_step_time, print_warning,
};

pub fn run_kmeans(args: &KmeansArgs, ctx: &mut RunContext) -> Result<()> {
    print_config(
        "k-means clustering",
        &[
            ("Input", args.data.input.display().to_string()),
            ("Features", args.features.join(", ")),
            ("k", args.k.to_string()),
            ("k range", format!("{}..={}", args.k_min, args.k_max)),
            ("Standardize", args.standardize.to_string()),
        ],
    );

    print_step_header(1, "Load Data");
    let step_start = Instant::now();
    let df = load_input(&args.data.input, args.data.infer_schema_length)?;
    require_columns(&df, &args.features)?;

    let columns = args
        .features
        .iter()
        .map(|name| column_as_f64(&df, name))
        .collect::<Result<Vec<_>>>()?;
    let raw: Vec<Vec<f64>> = (0..df.height())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect();
    let points = if args.standardize {
        standardize(&raw)
    } else {
        raw
    };
    print_step_time(step_start.elapsed());

    let template = KMeansConfig {
        max_iter: args.max_iter,
        ..Default::default()
    };

    print_step_header(2, "Choose k");
    let step_start = Instant::now();
    let k_max = args.k_max.min(points.len());
    let ks: Vec<usize> = (args.k_min.max(1)..=k_max).collect();
    if ks.is_empty() {
        print_warning("The k range is empty for this dataset; skipping the evaluation");
    } else {
        let spinner = create_spinner(&format!("Evaluating {} values of k...", ks.len()));
        let evaluations = evaluate_k_range(&points, &ks, &template, ctx.seed)?;
        finish_with_success(&spinner, "Evaluation complete");
        display_k_evaluation(&evaluations);

        let wcss: Vec<f64> = evaluations.iter().map(|e| e.wcss).collect();
        let silhouette: Vec<f64> = evaluations.iter().map(|e| e.silhouette).collect();
        print_sparkline("WCSS", &wcss);
        print_sparkline("Silhouette", &silhouette);

        ctx.export_json("kmeans_evaluation.json", &evaluations)?;
        ctx.export_series(
            "kmeans_elbow.csv",
            vec![
                series("k", ks.iter().map(|&k| k as f64).collect()),
                series("wcss", wcss),
                series("silhouette", silhouette),
            ],
        )?;
    }
    print_step_time(step_start.elapsed());

    print_step_header(3, "Final Clustering");
    let step_start = Instant::now();
    let config = KMeansConfig {
        k: args.k,
        ..template
    };
    let mut rng = ctx.rng();
    let result = kmeans(&points, &config, &mut rng)?;
    if result.converged {
        print_count("iterations to convergence", result.iterations, None);
    } else {
        print_warning(&format!(
            "k-means stopped after {} iterations without converging",
            result.iterations
        ));
    }
    if args.standardize {
        print_info("Centroids are in standardized units");
    }
    display_centroids(&args.features, &result.centroids, &result.labels);
    print_info(&format!("Within-cluster sum of squares: {:.4}", result.wcss));

    ctx.export_json("kmeans_result.json", &result)?;
    let mut assignment: Vec<(String, Vec<f64>)> = args
        .features
        .iter()
        .enumerate()
        .map(|(j, name)| series(name, points.iter().map(|p| p[j]).collect()))
        .collect();
    assignment.push(series(
        "cluster",
        result.labels.iter().map(|&l| l as f64).collect(),
    ));
    ctx.export_series("kmeans_assignments.csv", assignment)?;
    print_step_time(step_start.elapsed());

    Ok(())
}

fn dataset_series(prefix: &str, data: &KnnDataset) -> Vec<(String, Vec<f64>)> {
    let dim = data.features.first().map(|f| f.len()).unwrap_or(0);
    let mut out: Vec<(String, Vec<f64>)> = (0..dim)
        .map(|j| {
            (
                format!("{}_x{}", prefix, j + 1),
                data.features.iter().map(|f| f[j]).collect(),
            )
        })
        .collect();
    out.push((
        format!("{}_y", prefix),
        data.labels.iter().map(|&l| l as f64).collect(),
    ));
    out
}

pub fn run_knn(args: &KnnArgs, ctx: &mut RunContext) -> Result<()> {
    let source = match &args.input {
        Some(path) => path.display().to_string(),
        None => "synthetic boundary data".to_string(),
    };
    print_config(
        "k-nearest neighbours",
        &[
            ("Data", source),
            ("k range", format!("1..={}", args.k_max)),
        ],
    );

    print_step_header(1, "Prepare Train / Test Sets");
    let step_start = Instant::now();
    let (train, test) = match &args.input {
        Some(path) => {
            let target = args
                .target
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--target is required with --input"))?;
            if args.features.is_empty() {
                anyhow::bail!("--features is required with --input");
            }
            let df = load_input(path, args.infer_schema_length)?;
            let mut required = args.features.clone();
            required.push(target.to_string());
            require_columns(&df, &required)?;

            let data = KnnDataset::from_dataframe(&df, &args.features, target)?;
            let mut rng = ctx.rng();
            data.train_test_split(args.train_frac, &mut rng)
        }
        None => {
            let mut train_rng = StdRng::seed_from_u64(args.train_seed.unwrap_or(ctx.seed));
            let mut test_rng = StdRng::seed_from_u64(args.test_seed);
            let train = simulate_boundary_data(args.train_size, &mut train_rng);
            let test = simulate_boundary_data(args.test_size, &mut test_rng);
            ctx.export_series("knn_train.csv", dataset_series("train", &train))?;
            ctx.export_series("knn_test.csv", dataset_series("test", &test))?;
            (train, test)
        }
    };
    print_count("training points", train.len(), None);
    print_count("test points", test.len(), None);
    if train.is_empty() || test.is_empty() {
        anyhow::bail!("Both the training and the test set need at least one point");
    }
    print_step_time(step_start.elapsed());

    print_step_header(2, "Accuracy by k");
    let step_start = Instant::now();
    let k_max = args.k_max.min(train.len());
    if k_max < args.k_max {
        print_warning(&format!(
            "k is capped at the training set size ({})",
            train.len()
        ));
    }
    let spinner = create_spinner("Classifying the test set...");
    let curve = accuracy_curve(&train, &test, k_max)?;
    finish_with_success(&spinner, "Classification complete");

    let best = best_k(&curve);
    display_accuracy_table(&curve, best);
    let accuracy: Vec<f64> = curve.iter().map(|p| p.accuracy).collect();
    print_sparkline("Accuracy", &accuracy);

    ctx.export_json("knn_accuracy.json", &curve)?;
    ctx.export_series(
        "knn_accuracy.csv",
        vec![
            series("k", curve.iter().map(|p| p.k as f64).collect()),
            series("accuracy", accuracy),
        ],
    )?;
    print_step_time(step_start.elapsed());

    Ok(())
}
