//! Model metadata: provenance, last metrics, CV and tuning records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricsRecord, Scoring};
use crate::params::ParamSet;
use crate::result::CrossValidationRecord;
use crate::target::Task;

/// Scores reported by one call to `Model::train`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Scorer used for both scores (accuracy or R²).
    pub scoring: Scoring,
    /// Score on the rows the estimator was fitted on.
    pub train_score: f64,
    /// Score on the held-out rows, if a validation split was requested.
    pub val_score: Option<f64>,
    /// Number of rows fitted on.
    pub n_train: usize,
    /// Number of held-out rows.
    pub n_validation: usize,
}

/// Outcome of the last grid search, as stored in model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRecord {
    /// The winning parameter combination.
    pub best_params: ParamSet,
    /// Its mean cross-validated score.
    pub best_score: f64,
    /// Number of folds used.
    pub cv: usize,
    /// Scorer used to rank candidates.
    pub scoring: Scoring,
    /// Number of candidates evaluated.
    pub n_candidates: usize,
}

/// Everything known about a model besides its learned parameters.
///
/// Engine runs overwrite their own entry: a new CV run replaces
/// `cross_validation`, a new search replaces `hyperparameter_tuning`, and
/// each evaluation replaces `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name.
    pub name: String,
    /// Estimator family, or `"unconfigured"`.
    pub model_type: String,
    /// Learning task.
    pub task: Task,
    /// When the model object was created.
    pub created_at: DateTime<Utc>,
    /// Whether the model holds a usable fit.
    pub trained: bool,
    /// When the last successful fit finished.
    pub trained_at: Option<DateTime<Utc>>,
    /// Scores from the last `train` call.
    pub last_training: Option<TrainingMetrics>,
    /// Metrics from the last evaluation.
    pub metrics: Option<MetricsRecord>,
    /// Result of the last cross-validation run.
    pub cross_validation: Option<CrossValidationRecord>,
    /// Result of the last grid search.
    pub hyperparameter_tuning: Option<TuningRecord>,
}

impl ModelMetadata {
    /// Fresh metadata for an untrained model.
    #[must_use]
    pub fn new(name: &str, model_type: &str, task: Task) -> Self {
        Self {
            name: name.to_string(),
            model_type: model_type.to_string(),
            task,
            created_at: Utc::now(),
            trained: false,
            trained_at: None,
            last_training: None,
            metrics: None,
            cross_validation: None,
            hyperparameter_tuning: None,
        }
    }

    pub(crate) fn mark_trained(&mut self) {
        self.trained = true;
        self.trained_at = Some(Utc::now());
    }
}
