//! Accuracy regression tests for foldwise-cv.
//!
//! These tests drive the cross-validation and grid-search engine through its
//! public API with small deterministic learners, so changes to partitioning
//! or aggregation show up as score changes.

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use foldwise_cv::{
    CrossValidation, CrossValidationRecord, CvError, Estimator, FoldPartitioner, Model,
    ModelError, ModelMetadata, ParamGrid, ParamSet, ParamValue, Scoring, SupervisedModel, Task,
    TrainingMetrics, validate_rows, validate_training,
};

// ---------------------------------------------------------------------------
// Helpers: deterministic datasets and learners
// ---------------------------------------------------------------------------

/// 100 samples, 4 features, two balanced classes.
///
/// Features 0-1 are informative (class * `gap` + noise in [0, 1]).
/// Features 2-3 are pure noise in [0, 1].
fn make_classification(gap: f64) -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut features = Vec::with_capacity(100);
    let mut labels = Vec::with_capacity(100);
    for i in 0..100 {
        let class = i % 2;
        labels.push(class);
        let row: Vec<f64> = (0..4)
            .map(|f| {
                let base = if f < 2 { class as f64 * gap } else { 0.0 };
                base + rng.r#gen::<f64>()
            })
            .collect();
        features.push(row);
    }
    (features, labels)
}

/// Assigns each row to the class whose training centroid is nearest.
///
/// `shrink` pulls centroids toward the global mean, so grid search has a
/// parameter that matters.
#[derive(Debug, Clone, Default)]
struct NearestCentroid {
    shrink: f64,
    centroids: Vec<Vec<f64>>,
}

impl Estimator for NearestCentroid {
    type Target = usize;

    fn kind(&self) -> &'static str {
        "nearest_centroid"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[usize]) -> Result<(), ModelError> {
        let n_features = validate_training(features, targets)?;
        let n_classes = targets.iter().max().copied().unwrap_or(0) + 1;
        let mut sums = vec![vec![0.0; n_features]; n_classes];
        let mut counts = vec![0usize; n_classes];
        let mut global = vec![0.0; n_features];
        for (row, &t) in features.iter().zip(targets) {
            counts[t] += 1;
            for (j, v) in row.iter().enumerate() {
                sums[t][j] += v;
                global[j] += v;
            }
        }
        let n = features.len() as f64;
        self.centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                sum.iter()
                    .zip(&global)
                    .map(|(s, g)| {
                        let own = if count == 0 { g / n } else { s / count as f64 };
                        (1.0 - self.shrink) * own + self.shrink * g / n
                    })
                    .collect()
            })
            .collect();
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, ModelError> {
        let Some(first) = self.centroids.first() else {
            return Err(ModelError::UntrainedModel {
                name: self.kind().to_string(),
            });
        };
        validate_rows(features, first.len())?;
        Ok(features
            .iter()
            .map(|row| {
                let dist = |c: &Vec<f64>| -> f64 {
                    c.iter().zip(row).map(|(a, b)| (a - b).powi(2)).sum()
                };
                self.centroids
                    .iter()
                    .enumerate()
                    .min_by(|a, b| dist(a.1).total_cmp(&dist(b.1)))
                    .map_or(0, |(class, _)| class)
            })
            .collect())
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        match name {
            "shrink" => {
                let v = value.as_f64(name)?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(value.invalid(name, "must be in [0, 1]"));
                }
                self.shrink = v;
                Ok(())
            }
            other => Err(ModelError::UnknownParam {
                estimator: self.kind(),
                name: other.to_string(),
            }),
        }
    }

    fn params(&self) -> ParamSet {
        [("shrink".to_string(), self.shrink.into())].into_iter().collect()
    }
}

/// A regression model implemented directly against [`Model`]: predicts the
/// training mean.
struct MeanModel {
    mean: Option<f64>,
    features: Vec<String>,
    importance: BTreeMap<String, f64>,
    metadata: ModelMetadata,
    train_calls: usize,
}

impl MeanModel {
    fn new() -> Self {
        Self {
            mean: None,
            features: Vec::new(),
            importance: BTreeMap::new(),
            metadata: ModelMetadata::new("mean", "mean", Task::Regression),
            train_calls: 0,
        }
    }
}

impl Model for MeanModel {
    type Target = f64;

    fn name(&self) -> &str {
        "mean"
    }

    fn train(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        _validation_split: f64,
    ) -> Result<TrainingMetrics, ModelError> {
        validate_training(features, targets)?;
        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        self.mean = Some(mean);
        self.train_calls += 1;
        Ok(TrainingMetrics {
            scoring: Scoring::R2,
            train_score: 0.0,
            val_score: None,
            n_train: targets.len(),
            n_validation: 0,
        })
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let mean = self.mean.ok_or(ModelError::UntrainedModel {
            name: "mean".into(),
        })?;
        Ok(vec![mean; features.len()])
    }

    fn predict_proba(&self, _features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        Err(ModelError::ProbabilitiesUnsupported { estimator: "mean" })
    }

    fn is_trained(&self) -> bool {
        self.mean.is_some()
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn set_feature_names(&mut self, names: Vec<String>) {
        self.features = names;
    }

    fn feature_importance(&self) -> &BTreeMap<String, f64> {
        &self.importance
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ModelMetadata {
        &mut self.metadata
    }
}

// ---------------------------------------------------------------------------
// a) classification_cv_shape_and_range
// ---------------------------------------------------------------------------

/// 100x4, 50/50 labels, 5 stratified folds: five scores per metric, all in
/// [0, 1], with a consistent mean and population std.
#[test]
fn classification_cv_shape_and_range() {
    let (features, labels) = make_classification(3.0);
    let mut model = SupervisedModel::new("centroid", NearestCentroid::default());
    let result = model
        .cross_validate_classification(&features, &labels, 5, true)
        .unwrap();

    assert_eq!(result.cv_folds, 5);
    for scores in [
        &result.accuracy_scores,
        &result.precision_scores,
        &result.recall_scores,
        &result.f1_scores,
    ] {
        assert_eq!(scores.len(), 5);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    let mean = result.accuracy_scores.iter().sum::<f64>() / 5.0;
    assert!((result.mean_accuracy - mean).abs() < 1e-12);
    let var = result
        .accuracy_scores
        .iter()
        .map(|a| (a - mean).powi(2))
        .sum::<f64>()
        / 5.0;
    assert!((result.std_accuracy - var.sqrt()).abs() < 1e-12);

    // Well-separated classes.
    assert!(
        result.mean_accuracy > 0.95,
        "cv mean_accuracy {} <= 0.95",
        result.mean_accuracy
    );
}

// ---------------------------------------------------------------------------
// b) too_many_folds
// ---------------------------------------------------------------------------

/// cv = 10 on 5 samples fails before any training.
#[test]
fn too_many_folds() {
    let features: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
    let labels = vec![0, 1, 0, 1, 0];
    let mut model = SupervisedModel::new("centroid", NearestCentroid::default());
    let err = model
        .cross_validate_classification(&features, &labels, 10, true)
        .unwrap_err();
    assert!(matches!(
        err,
        CvError::InsufficientData {
            n_samples: 5,
            n_folds: 10
        }
    ));
    assert!(!model.is_trained());
}

// ---------------------------------------------------------------------------
// c) constant_regression_target
// ---------------------------------------------------------------------------

/// A constant target predicted perfectly gives zero error and finite R².
#[test]
fn constant_regression_target() {
    let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 1.0]).collect();
    let targets = vec![4.5; 20];
    let mut model = MeanModel::new();
    let result = CrossValidation::new(4)
        .unwrap()
        .regression(&mut model, &features, &targets)
        .unwrap();

    assert_eq!(result.cv_folds, 4);
    assert!(result.mean_mse.abs() < 1e-12);
    assert!(result.mean_mae.abs() < 1e-12);
    assert!(result.r2_scores.iter().all(|r| r.is_finite()));
    assert_eq!(model.train_calls, 4);
    assert!(matches!(
        model.metadata().cross_validation,
        Some(CrossValidationRecord::Regression(_))
    ));
}

// ---------------------------------------------------------------------------
// d) repeated_runs_are_identical
// ---------------------------------------------------------------------------

/// Fixed seed: the same inputs give the same per-fold scores.
#[test]
fn repeated_runs_are_identical() {
    let (features, labels) = make_classification(0.8);
    let cv = CrossValidation::new(5).unwrap();

    let mut first = SupervisedModel::new("a", NearestCentroid::default());
    let mut second = SupervisedModel::new("b", NearestCentroid::default());
    let r1 = cv.classification(&mut first, &features, &labels).unwrap();
    let r2 = cv.classification(&mut second, &features, &labels).unwrap();
    assert_eq!(r1, r2);
}

// ---------------------------------------------------------------------------
// e) stratified_fold_sizes
// ---------------------------------------------------------------------------

/// 100 samples, 5 stratified folds: every validation fold has 20 rows, 10
/// per class.
#[test]
fn stratified_fold_sizes() {
    let (_, labels) = make_classification(1.0);
    let folds = FoldPartitioner::new(5)
        .unwrap()
        .split(labels.len(), Some(&labels))
        .unwrap();
    for fold in folds {
        assert_eq!(fold.validation_indices.len(), 20);
        assert_eq!(fold.train_indices.len(), 80);
        let ones = fold
            .validation_indices
            .iter()
            .filter(|&&i| labels[i] == 1)
            .count();
        assert_eq!(ones, 10);
    }
}

// ---------------------------------------------------------------------------
// f) grid_search_prefers_unshrunk_centroids
// ---------------------------------------------------------------------------

/// Shrinking centroids fully onto the global mean destroys the signal, so
/// the search must pick a smaller shrink and refit on all rows.
#[test]
fn grid_search_prefers_unshrunk_centroids() {
    let (features, labels) = make_classification(3.0);
    let mut model = SupervisedModel::new("centroid", NearestCentroid::default());
    let grid = ParamGrid::new().with_axis("shrink", [1.0, 0.0]);
    let result = model
        .hyperparameter_tune(&features, &labels, grid, 5, Some(Scoring::F1), -1)
        .unwrap();

    assert_eq!(result.best_params["shrink"], ParamValue::Float(0.0));
    assert_eq!(result.cv_results.len(), 2);
    assert_eq!(result.cv_results[1].rank, 1);
    assert!(result.cv_results[1].mean_score > result.cv_results[0].mean_score);
    assert!(model.is_trained());

    let predictions = model.predict(&features).unwrap();
    assert_eq!(predictions.len(), features.len());

    let tuning = model.metadata().hyperparameter_tuning.as_ref().unwrap();
    assert_eq!(tuning.scoring, Scoring::F1);
    assert_eq!(tuning.n_candidates, 2);
}

// ---------------------------------------------------------------------------
// g) invalid_parameter_value
// ---------------------------------------------------------------------------

/// An out-of-range grid value aborts the search with the candidate index.
#[test]
fn invalid_parameter_value() {
    let (features, labels) = make_classification(3.0);
    let mut model = SupervisedModel::new("centroid", NearestCentroid::default());
    let grid = ParamGrid::new().with_axis("shrink", [0.5, 2.0]);
    let err = model
        .hyperparameter_tune(&features, &labels, grid, 3, None, 1)
        .unwrap_err();
    assert!(matches!(err, CvError::CandidateParams { candidate: 1, .. }));
}
