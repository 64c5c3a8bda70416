//! Criterion benchmarks for foldwise-cv: fold partitioning and metric evaluation.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use foldwise_cv::{FoldPartitioner, ParamGrid, evaluate_classification, evaluate_regression};

fn make_labels(n_samples: usize, n_classes: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_samples).map(|_| rng.gen_range(0..n_classes)).collect()
}

fn bench_stratified_split(c: &mut Criterion) {
    let labels = make_labels(10_000, 5, 42);
    let partitioner = FoldPartitioner::new(10).unwrap();

    c.bench_function("stratified_split_10000_10folds", |b| {
        b.iter(|| {
            partitioner
                .split(labels.len(), Some(&labels))
                .unwrap()
                .map(|f| f.validation_indices.len())
                .sum::<usize>()
        });
    });
}

fn bench_contiguous_split(c: &mut Criterion) {
    let partitioner = FoldPartitioner::new(10).unwrap();

    c.bench_function("contiguous_split_10000_10folds", |b| {
        b.iter(|| partitioner.split(10_000, None).unwrap().count());
    });
}

fn bench_classification_metrics(c: &mut Criterion) {
    let y_true = make_labels(10_000, 5, 42);
    let y_pred = make_labels(10_000, 5, 7);

    c.bench_function("evaluate_classification_10000_5class", |b| {
        b.iter(|| evaluate_classification(&y_true, &y_pred).unwrap());
    });
}

fn bench_regression_metrics(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let y_true: Vec<f64> = (0..10_000).map(|_| rng.r#gen::<f64>() * 10.0).collect();
    let y_pred: Vec<f64> = y_true.iter().map(|v| v + rng.r#gen::<f64>() - 0.5).collect();

    c.bench_function("evaluate_regression_10000", |b| {
        b.iter(|| evaluate_regression(&y_true, &y_pred).unwrap());
    });
}

fn bench_grid_expansion(c: &mut Criterion) {
    let grid = ParamGrid::new()
        .with_axis("n_trees", [10usize, 50, 100, 200])
        .with_axis("max_depth", [2usize, 4, 8, 16])
        .with_axis("min_samples_leaf", [1usize, 2, 5])
        .with_axis("max_features", ["sqrt", "all"]);

    c.bench_function("param_grid_96_candidates", |b| {
        b.iter(|| grid.candidates().unwrap());
    });
}

criterion_group!(
    benches,
    bench_stratified_split,
    bench_contiguous_split,
    bench_classification_metrics,
    bench_regression_metrics,
    bench_grid_expansion
);
criterion_main!(benches);
