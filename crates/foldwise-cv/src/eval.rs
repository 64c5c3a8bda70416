//! K-fold cross-validation loops for classification and regression models.

use std::fmt::Debug;

use tracing::{error, info, instrument};

use crate::error::{CvError, MetricsError, ModelError};
use crate::estimator::Estimator;
use crate::metadata::TuningRecord;
use crate::metrics::{
    ClassificationMetrics, MetricsRecord, RegressionMetrics, evaluate_classification,
    evaluate_regression,
};
use crate::model::{Model, SupervisedModel};
use crate::partition::{FoldPartitioner, take_rows};
use crate::result::{ClassificationCvResult, CrossValidationRecord, RegressionCvResult};
use crate::target::Target;

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter    | Default |
/// |--------------|---------|
/// | `seed`       | 42      |
/// | `stratified` | `true`  |
///
/// Folds are always shuffled. `stratified` only applies to classification.
#[derive(Debug, Clone)]
pub struct CrossValidation {
    n_folds: usize,
    seed: u64,
    stratified: bool,
}

impl CrossValidation {
    /// Create a new cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`CvError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, CvError> {
        if n_folds < 2 {
            return Err(CvError::InvalidFoldCount { n_folds });
        }
        Ok(Self {
            n_folds,
            seed: 42,
            stratified: true,
        })
    }

    /// Set the random seed for fold shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Preserve class proportions in each fold (classification only).
    #[must_use]
    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Run k-fold cross-validation on a classifier.
    ///
    /// Each fold retrains `model` from scratch on the other folds, predicts
    /// the held-out fold, and scores accuracy and weighted
    /// precision/recall/F1. On success the result replaces
    /// `metadata.cross_validation` and the last fold's metrics replace
    /// `metadata.metrics`; the model is left holding the last fold's fit.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::TargetLengthMismatch`] | `labels.len() != features.len()` |
    /// | [`CvError::InsufficientData`] | Fewer samples than folds |
    /// | [`CvError::FoldExecution`] | Any fold fails to train, predict, or score |
    ///
    /// No partial result is returned and metadata is untouched on failure.
    #[instrument(skip_all, fields(model = model.name(), n_folds = self.n_folds, n_samples = features.len()))]
    pub fn classification<M: Model<Target = usize>>(
        &self,
        model: &mut M,
        features: &[Vec<f64>],
        labels: &[usize],
    ) -> Result<ClassificationCvResult, CvError> {
        let strata = if self.stratified { usize::strata(labels) } else { None };
        let folds = self
            .run_folds(model, features, labels, strata, evaluate_classification)
            .inspect_err(|e| error!(model = model.name(), error = %e, "classification cross-validation failed"))?;

        let result = ClassificationCvResult::from_folds(&folds);
        info!(
            mean_accuracy = result.mean_accuracy,
            std_accuracy = result.std_accuracy,
            mean_f1 = result.mean_f1,
            "cross-validation complete"
        );

        let metadata = model.metadata_mut();
        metadata.metrics = folds.last().copied().map(MetricsRecord::Classification);
        metadata.cross_validation = Some(CrossValidationRecord::Classification(result.clone()));
        Ok(result)
    }

    /// Run k-fold cross-validation on a regressor.
    ///
    /// Same contract as [`CrossValidation::classification`] without
    /// stratification, scoring MSE, RMSE, MAE, and R².
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::TargetLengthMismatch`] | `targets.len() != features.len()` |
    /// | [`CvError::InsufficientData`] | Fewer samples than folds |
    /// | [`CvError::FoldExecution`] | Any fold fails to train, predict, or score |
    #[instrument(skip_all, fields(model = model.name(), n_folds = self.n_folds, n_samples = features.len()))]
    pub fn regression<M: Model<Target = f64>>(
        &self,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[f64],
    ) -> Result<RegressionCvResult, CvError> {
        let folds = self
            .run_folds(model, features, targets, None, evaluate_regression)
            .inspect_err(|e| error!(model = model.name(), error = %e, "regression cross-validation failed"))?;

        let result = RegressionCvResult::from_folds(&folds);
        info!(
            mean_rmse = result.mean_rmse,
            mean_r2 = result.mean_r2,
            std_r2 = result.std_r2,
            "cross-validation complete"
        );

        let metadata = model.metadata_mut();
        metadata.metrics = folds.last().copied().map(MetricsRecord::Regression);
        metadata.cross_validation = Some(CrossValidationRecord::Regression(result.clone()));
        Ok(result)
    }

    /// Train, predict, and score every fold in order; stop at the first failure.
    fn run_folds<M, R>(
        &self,
        model: &mut M,
        features: &[Vec<f64>],
        targets: &[M::Target],
        strata: Option<&[usize]>,
        score: fn(&[M::Target], &[M::Target]) -> Result<R, MetricsError>,
    ) -> Result<Vec<R>, CvError>
    where
        M: Model,
        R: Debug,
    {
        if targets.len() != features.len() {
            return Err(CvError::TargetLengthMismatch {
                n_samples: features.len(),
                n_targets: targets.len(),
            });
        }

        let folds = FoldPartitioner::new(self.n_folds)?
            .with_seed(self.seed)
            .split(features.len(), strata)?;

        let mut per_fold = Vec::with_capacity(self.n_folds);
        for fold in folds {
            let fold_idx = fold.fold_idx;
            let wrap = |source: ModelError| CvError::FoldExecution {
                fold: fold_idx,
                source,
            };

            let train_x = take_rows(features, &fold.train_indices);
            let train_y = take_rows(targets, &fold.train_indices);
            let val_x = take_rows(features, &fold.validation_indices);
            let val_y = take_rows(targets, &fold.validation_indices);

            model.train(&train_x, &train_y, 0.0).map_err(wrap)?;
            let predictions = model.predict(&val_x).map_err(wrap)?;
            let metrics = score(&val_y, &predictions).map_err(|e| wrap(e.into()))?;

            info!(
                fold = fold_idx,
                n_train = fold.train_indices.len(),
                n_validation = fold.validation_indices.len(),
                ?metrics,
                "fold completed"
            );
            per_fold.push(metrics);
        }
        Ok(per_fold)
    }
}

impl<E: Estimator<Target = usize>> SupervisedModel<E> {
    /// Cross-validate this classifier with `cv` shuffled folds (seed 42).
    ///
    /// # Errors
    ///
    /// See [`CrossValidation::classification`]; also
    /// [`CvError::InvalidFoldCount`] if `cv` < 2.
    pub fn cross_validate_classification(
        &mut self,
        features: &[Vec<f64>],
        labels: &[usize],
        cv: usize,
        stratified: bool,
    ) -> Result<ClassificationCvResult, CvError> {
        CrossValidation::new(cv)
            .inspect_err(|e| error!(model = %self.name, error = %e, "invalid cross-validation config"))?
            .with_stratified(stratified)
            .classification(self, features, labels)
    }
}

impl<E: Estimator<Target = f64>> SupervisedModel<E> {
    /// Cross-validate this regressor with `cv` shuffled folds (seed 42).
    ///
    /// # Errors
    ///
    /// See [`CrossValidation::regression`]; also
    /// [`CvError::InvalidFoldCount`] if `cv` < 2.
    pub fn cross_validate_regression(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        cv: usize,
    ) -> Result<RegressionCvResult, CvError> {
        CrossValidation::new(cv)
            .inspect_err(|e| error!(model = %self.name, error = %e, "invalid cross-validation config"))?
            .regression(self, features, targets)
    }
}

impl<E: Estimator> SupervisedModel<E> {
    /// The last cross-validation result recorded in metadata, if any.
    #[must_use]
    pub fn get_cross_validation_results(&self) -> Option<&CrossValidationRecord> {
        self.metadata.cross_validation.as_ref()
    }

    /// The last grid-search summary recorded in metadata, if any.
    #[must_use]
    pub fn get_hyperparameter_tuning_results(&self) -> Option<&TuningRecord> {
        self.metadata.hyperparameter_tuning.as_ref()
    }

    /// Score class predictions and store them in `metadata.metrics`.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricsError`]; metadata is untouched on failure.
    pub fn evaluate_classification(
        &mut self,
        y_true: &[usize],
        y_pred: &[usize],
    ) -> Result<ClassificationMetrics, MetricsError> {
        let m = evaluate_classification(y_true, y_pred)
            .inspect_err(|e| error!(model = %self.name, error = %e, "classification evaluation failed"))?;
        self.metadata.metrics = Some(MetricsRecord::Classification(m));
        Ok(m)
    }

    /// Score continuous predictions and store them in `metadata.metrics`.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricsError`]; metadata is untouched on failure.
    pub fn evaluate_regression(
        &mut self,
        y_true: &[f64],
        y_pred: &[f64],
    ) -> Result<RegressionMetrics, MetricsError> {
        let m = evaluate_regression(y_true, y_pred)
            .inspect_err(|e| error!(model = %self.name, error = %e, "regression evaluation failed"))?;
        self.metadata.metrics = Some(MetricsRecord::Regression(m));
        Ok(m)
    }
}
