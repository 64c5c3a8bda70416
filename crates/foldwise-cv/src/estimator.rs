//! The trainable unit a model wraps, and shared input validation.

use crate::error::ModelError;
use crate::params::{ParamSet, ParamValue};
use crate::target::Target;

/// A configurable, cloneable learner.
///
/// Grid search clones an estimator once per candidate, applies the
/// candidate's parameters with [`Estimator::set_params`], and fits the clone
/// on each fold, so implementations must not share mutable state between
/// clones.
pub trait Estimator: Clone + Send + Sync {
    /// Target type this estimator learns.
    type Target: Target;

    /// Short, stable name of the estimator family (e.g. `"tree_ensemble_classifier"`).
    fn kind(&self) -> &'static str;

    /// Fit from scratch on the given rows. Any previous fit is discarded.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] for invalid data or hyperparameters.
    fn fit(&mut self, features: &[Vec<f64>], targets: &[Self::Target]) -> Result<(), ModelError>;

    /// Predict one target per row.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UntrainedModel`] before a successful fit, or a
    /// validation error for malformed rows.
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<Self::Target>, ModelError>;

    /// Predict class probabilities, one row per sample.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ProbabilitiesUnsupported`] unless overridden.
    fn predict_proba(&self, _features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        Err(ModelError::ProbabilitiesUnsupported {
            estimator: self.kind(),
        })
    }

    /// Set one hyperparameter by name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownParam`] or [`ModelError::InvalidParamValue`].
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError>;

    /// Current hyperparameters, keyed by name.
    fn params(&self) -> ParamSet;

    /// Per-feature importances from the last fit, in column order.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Apply every parameter in `params`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Propagates the first [`Estimator::set_param`] failure.
    fn set_params(&mut self, params: &ParamSet) -> Result<(), ModelError> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}

/// Validate a feature matrix and return its column count.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::EmptyDataset`] | Zero rows |
/// | [`ModelError::ZeroFeatures`] | Zero columns |
/// | [`ModelError::FeatureCountMismatch`] | Ragged rows |
/// | [`ModelError::NonFiniteValue`] | NaN or infinite value |
pub fn validate_features(features: &[Vec<f64>]) -> Result<usize, ModelError> {
    let Some(first) = features.first() else {
        return Err(ModelError::EmptyDataset);
    };
    let n_features = first.len();
    if n_features == 0 {
        return Err(ModelError::ZeroFeatures);
    }
    check_rows(features, n_features)?;
    Ok(n_features)
}

/// Validate prediction rows against the column count seen at fit time.
///
/// An empty batch is accepted and yields no predictions.
///
/// # Errors
///
/// Returns [`ModelError::FeatureCountMismatch`] or [`ModelError::NonFiniteValue`].
pub fn validate_rows(features: &[Vec<f64>], n_features: usize) -> Result<(), ModelError> {
    check_rows(features, n_features)
}

/// Validate a training batch: features plus one valid target per row.
///
/// # Errors
///
/// Everything [`validate_features`] returns, plus
/// [`ModelError::TargetLengthMismatch`]. Non-finite regression targets are
/// reported as [`ModelError::NonFiniteValue`] with `feature_index` equal to
/// the column count.
pub fn validate_training<T: Target>(
    features: &[Vec<f64>],
    targets: &[T],
) -> Result<usize, ModelError> {
    let n_features = validate_features(features)?;
    if targets.len() != features.len() {
        return Err(ModelError::TargetLengthMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }
    if let Some(sample_index) = targets.iter().position(|t| !t.is_valid()) {
        return Err(ModelError::NonFiniteValue {
            sample_index,
            feature_index: n_features,
        });
    }
    Ok(n_features)
}

fn check_rows(features: &[Vec<f64>], n_features: usize) -> Result<(), ModelError> {
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(ModelError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    Ok(())
}
