//! Target value types and the learning task they imply.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::MetricsError;
use crate::metrics::{MetricsRecord, Scoring, evaluate_classification, evaluate_regression};

/// Supervised learning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Integer-coded class labels.
    Classification,
    /// Continuous values.
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => f.write_str("classification"),
            Task::Regression => f.write_str("regression"),
        }
    }
}

/// A target value type: `usize` class indices or `f64` values.
pub trait Target:
    Copy + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The task implied by this target type.
    const TASK: Task;

    /// Scorer used for the train/validation scores reported by `Model::train`.
    fn default_scoring() -> Scoring;

    /// Compute the full metric set for this task.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricsError`] for empty or mismatched input.
    fn evaluate(y_true: &[Self], y_pred: &[Self]) -> Result<MetricsRecord, MetricsError>;

    /// Score predictions with the named scorer.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricsError`] for empty or mismatched input.
    fn score(scoring: Scoring, y_true: &[Self], y_pred: &[Self]) -> Result<f64, MetricsError>;

    /// Class labels to stratify folds on, if this task supports stratification.
    fn strata(targets: &[Self]) -> Option<&[usize]>;

    /// Return `true` if the value can be trained on.
    fn is_valid(self) -> bool;
}

impl Target for usize {
    const TASK: Task = Task::Classification;

    fn default_scoring() -> Scoring {
        Scoring::Accuracy
    }

    fn evaluate(y_true: &[Self], y_pred: &[Self]) -> Result<MetricsRecord, MetricsError> {
        evaluate_classification(y_true, y_pred).map(MetricsRecord::Classification)
    }

    fn score(scoring: Scoring, y_true: &[Self], y_pred: &[Self]) -> Result<f64, MetricsError> {
        let m = evaluate_classification(y_true, y_pred)?;
        Ok(scoring.pick_classification(&m))
    }

    fn strata(targets: &[Self]) -> Option<&[usize]> {
        Some(targets)
    }

    fn is_valid(self) -> bool {
        true
    }
}

impl Target for f64 {
    const TASK: Task = Task::Regression;

    fn default_scoring() -> Scoring {
        Scoring::R2
    }

    fn evaluate(y_true: &[Self], y_pred: &[Self]) -> Result<MetricsRecord, MetricsError> {
        evaluate_regression(y_true, y_pred).map(MetricsRecord::Regression)
    }

    fn score(scoring: Scoring, y_true: &[Self], y_pred: &[Self]) -> Result<f64, MetricsError> {
        let m = evaluate_regression(y_true, y_pred)?;
        Ok(scoring.pick_regression(&m))
    }

    fn strata(_targets: &[Self]) -> Option<&[usize]> {
        None
    }

    fn is_valid(self) -> bool {
        self.is_finite()
    }
}
