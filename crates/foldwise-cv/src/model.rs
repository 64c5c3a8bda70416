//! The model capability and a generic estimator-backed implementation.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, instrument};

use crate::error::{MetricsError, ModelError};
use crate::estimator::{Estimator, validate_training};
use crate::metadata::{ModelMetadata, TrainingMetrics};
use crate::metrics::MetricsRecord;
use crate::partition::take_rows;
use crate::target::Target;

/// Seed for the train/validation hold-out shuffle.
const HOLDOUT_SEED: u64 = 42;

/// A trainable predictor the engine can cross-validate.
///
/// Every call to [`Model::train`] fits from scratch, so the engine can
/// retrain the same instance on each fold.
pub trait Model {
    /// Target type: `usize` class labels or `f64` values.
    type Target: Target;

    /// Model name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Fit on `features`/`targets`, holding out `validation_split` of the rows
    /// for a validation score.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] on invalid data, an invalid split, or an
    /// estimator failure.
    fn train(
        &mut self,
        features: &[Vec<f64>],
        targets: &[Self::Target],
        validation_split: f64,
    ) -> Result<TrainingMetrics, ModelError>;

    /// Predict one target per row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UntrainedModel`] before a successful train.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<Self::Target>, ModelError>;

    /// Predict class probabilities.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UntrainedModel`] before a successful train, or
    /// [`ModelError::ProbabilitiesUnsupported`] for regression models.
    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError>;

    /// Return `true` once a train has succeeded.
    fn is_trained(&self) -> bool;

    /// Feature column names.
    fn feature_names(&self) -> &[String];

    /// Replace the feature column names.
    fn set_feature_names(&mut self, names: Vec<String>);

    /// Normalized importance per feature name, from the last fit.
    fn feature_importance(&self) -> &BTreeMap<String, f64>;

    /// The metadata record.
    fn metadata(&self) -> &ModelMetadata;

    /// Mutable access to the metadata record.
    fn metadata_mut(&mut self) -> &mut ModelMetadata;

    /// Compute the task's metrics and store them in `metadata.metrics`.
    ///
    /// On failure the error is logged and metadata is left untouched.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricsError`] for empty or mismatched input.
    fn evaluate(
        &mut self,
        y_true: &[Self::Target],
        y_pred: &[Self::Target],
    ) -> Result<MetricsRecord, MetricsError> {
        match Self::Target::evaluate(y_true, y_pred) {
            Ok(record) => {
                self.metadata_mut().metrics = Some(record);
                Ok(record)
            }
            Err(e) => {
                error!(model = self.name(), error = %e, "metric evaluation failed");
                Err(e)
            }
        }
    }
}

/// A model whose estimator can be swapped out, which grid search requires.
pub trait Tunable: Model {
    /// The estimator type.
    type Estimator: Estimator<Target = Self::Target>;

    /// The installed estimator, if any.
    fn estimator(&self) -> Option<&Self::Estimator>;

    /// Install a new, unfitted estimator. The model is untrained until the
    /// next successful [`Model::train`].
    fn install_estimator(&mut self, estimator: Self::Estimator);
}

/// A [`Model`] backed by any [`Estimator`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SupervisedModel<E> {
    pub(crate) name: String,
    pub(crate) estimator: Option<E>,
    pub(crate) trained: bool,
    pub(crate) features: Vec<String>,
    pub(crate) feature_importance: BTreeMap<String, f64>,
    pub(crate) metadata: ModelMetadata,
}

impl<E: Estimator> SupervisedModel<E> {
    /// Wrap an estimator.
    #[must_use]
    pub fn new(name: &str, estimator: E) -> Self {
        let metadata = ModelMetadata::new(name, estimator.kind(), E::Target::TASK);
        Self {
            name: name.to_string(),
            estimator: Some(estimator),
            trained: false,
            features: Vec::new(),
            feature_importance: BTreeMap::new(),
            metadata,
        }
    }

    /// A model with no estimator yet. Training and tuning fail until one is
    /// installed.
    #[must_use]
    pub fn unconfigured(name: &str) -> Self {
        Self {
            name: name.to_string(),
            estimator: None,
            trained: false,
            features: Vec::new(),
            feature_importance: BTreeMap::new(),
            metadata: ModelMetadata::new(name, "unconfigured", E::Target::TASK),
        }
    }

    /// Set feature column names.
    #[must_use]
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.features = names;
        self
    }

    /// Importances sorted by descending value.
    #[must_use]
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_importance
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn fitted_estimator(&self) -> Result<&E, ModelError> {
        match &self.estimator {
            Some(est) if self.trained => Ok(est),
            _ => Err(ModelError::UntrainedModel {
                name: self.name.clone(),
            }),
        }
    }

    fn refresh_importances(&mut self, n_features: usize) {
        self.feature_importance.clear();
        if self.features.len() != n_features {
            self.features = (0..n_features).map(|i| format!("feature_{i}")).collect();
        }
        let Some(raw) = self.estimator.as_ref().and_then(E::feature_importances) else {
            return;
        };
        let total: f64 = raw.iter().sum();
        for (name, value) in self.features.iter().zip(raw) {
            let normalized = if total > 0.0 { value / total } else { 0.0 };
            self.feature_importance.insert(name.clone(), normalized);
        }
    }
}

impl<E: Estimator> Model for SupervisedModel<E> {
    type Target = E::Target;

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(model = %self.name, n_samples = features.len(), validation_split = validation_split))]
    fn train(
        &mut self,
        features: &[Vec<f64>],
        targets: &[E::Target],
        validation_split: f64,
    ) -> Result<TrainingMetrics, ModelError> {
        if !(0.0..1.0).contains(&validation_split) {
            return Err(ModelError::InvalidValidationSplit {
                split: validation_split,
            });
        }
        let n_features = validate_training(features, targets)?;
        let n_samples = features.len();

        let n_validation = (n_samples as f64 * validation_split).ceil() as usize;
        if n_validation >= n_samples {
            return Err(ModelError::NoTrainingRows {
                split: validation_split,
                n_samples,
            });
        }

        let Some(estimator) = self.estimator.as_mut() else {
            return Err(ModelError::NoEstimator {
                name: self.name.clone(),
            });
        };

        let mut order: Vec<usize> = (0..n_samples).collect();
        if n_validation > 0 {
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(HOLDOUT_SEED));
        }
        let (val_idx, train_idx) = order.split_at(n_validation);

        let train_x = take_rows(features, train_idx);
        let train_y = take_rows(targets, train_idx);

        self.trained = false;
        self.metadata.trained = false;
        estimator.fit(&train_x, &train_y)?;

        let scoring = E::Target::default_scoring();
        let train_pred = estimator.predict(&train_x)?;
        let train_score = E::Target::score(scoring, &train_y, &train_pred)?;

        let val_score = if val_idx.is_empty() {
            None
        } else {
            let val_x = take_rows(features, val_idx);
            let val_y = take_rows(targets, val_idx);
            let val_pred = estimator.predict(&val_x)?;
            Some(E::Target::score(scoring, &val_y, &val_pred)?)
        };

        self.trained = true;
        self.refresh_importances(n_features);
        self.metadata.mark_trained();

        let metrics = TrainingMetrics {
            scoring,
            train_score,
            val_score,
            n_train: train_idx.len(),
            n_validation,
        };
        self.metadata.last_training = Some(metrics);

        debug!(
            train_score,
            ?val_score,
            n_train = metrics.n_train,
            n_validation,
            "training complete"
        );
        Ok(metrics)
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<E::Target>, ModelError> {
        self.fitted_estimator()?.predict(features)
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.fitted_estimator()?.predict_proba(features)
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn set_feature_names(&mut self, names: Vec<String>) {
        self.features = names;
    }

    fn feature_importance(&self) -> &BTreeMap<String, f64> {
        &self.feature_importance
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ModelMetadata {
        &mut self.metadata
    }
}

impl<E: Estimator> Tunable for SupervisedModel<E> {
    type Estimator = E;

    fn estimator(&self) -> Option<&E> {
        self.estimator.as_ref()
    }

    fn install_estimator(&mut self, estimator: E) {
        info!(model = %self.name, kind = estimator.kind(), "estimator installed");
        self.metadata.model_type = estimator.kind().to_string();
        self.metadata.trained = false;
        self.estimator = Some(estimator);
        self.trained = false;
        self.feature_importance.clear();
    }
}
