//! Classification and regression metric evaluators, and named scorers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::confusion::ConfusionMatrix;
use crate::error::MetricsError;
use crate::target::Task;

/// Accuracy plus support-weighted precision, recall, and F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// Support-weighted precision.
    pub precision: f64,
    /// Support-weighted recall.
    pub recall: f64,
    /// Support-weighted F1.
    pub f1: f64,
}

/// Error and goodness-of-fit metrics for continuous targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

/// The last metrics computed for a model, as stored in its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsRecord {
    /// Output of [`evaluate_classification`].
    Classification(ClassificationMetrics),
    /// Output of [`evaluate_regression`].
    Regression(RegressionMetrics),
}

/// Evaluate class predictions against the truth.
///
/// Precision, recall, and F1 are weighted by each class's true support;
/// a class with no predictions or no true samples contributes 0.0.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`MetricsError::EmptyInput`] | Zero samples |
/// | [`MetricsError::LengthMismatch`] | `y_true.len() != y_pred.len()` |
pub fn evaluate_classification(
    y_true: &[usize],
    y_pred: &[usize],
) -> Result<ClassificationMetrics, MetricsError> {
    let cm = ConfusionMatrix::from_labels(y_true, y_pred)?;
    let weighted = cm.weighted();
    Ok(ClassificationMetrics {
        accuracy: cm.accuracy(),
        precision: weighted.precision,
        recall: weighted.recall,
        f1: weighted.f1,
    })
}

/// Evaluate continuous predictions against the truth.
///
/// When `y_true` is constant, R² is 1.0 for a perfect prediction and 0.0
/// otherwise, so the result is always finite for finite input.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`MetricsError::EmptyInput`] | Zero samples |
/// | [`MetricsError::LengthMismatch`] | `y_true.len() != y_pred.len()` |
pub fn evaluate_regression(
    y_true: &[f64],
    y_pred: &[f64],
) -> Result<RegressionMetrics, MetricsError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricsError::LengthMismatch {
            n_true: y_true.len(),
            n_pred: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricsError::EmptyInput);
    }

    let n = y_true.len() as f64;
    let (ss_res, abs_sum) = y_true
        .iter()
        .zip(y_pred)
        .fold((0.0f64, 0.0f64), |(sq, ab), (t, p)| {
            let e = t - p;
            (sq + e * e, ab + e.abs())
        });
    let mse = ss_res / n;
    let mae = abs_sum / n;

    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Ok(RegressionMetrics {
        mse,
        rmse: mse.sqrt(),
        mae,
        r2,
    })
}

/// Named scorer for grid search. Higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// Classification accuracy.
    Accuracy,
    /// Weighted precision.
    Precision,
    /// Weighted recall.
    Recall,
    /// Weighted F1.
    F1,
    /// Coefficient of determination.
    R2,
    /// Negated mean squared error.
    NegMeanSquaredError,
    /// Negated root mean squared error.
    NegRootMeanSquaredError,
    /// Negated mean absolute error.
    NegMeanAbsoluteError,
}

impl Scoring {
    /// Return the task this scorer applies to.
    #[must_use]
    pub fn task(self) -> Task {
        match self {
            Scoring::Accuracy | Scoring::Precision | Scoring::Recall | Scoring::F1 => {
                Task::Classification
            }
            Scoring::R2
            | Scoring::NegMeanSquaredError
            | Scoring::NegRootMeanSquaredError
            | Scoring::NegMeanAbsoluteError => Task::Regression,
        }
    }

    /// Return the scorer's name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scoring::Accuracy => "accuracy",
            Scoring::Precision => "precision",
            Scoring::Recall => "recall",
            Scoring::F1 => "f1",
            Scoring::R2 => "r2",
            Scoring::NegMeanSquaredError => "neg_mean_squared_error",
            Scoring::NegRootMeanSquaredError => "neg_root_mean_squared_error",
            Scoring::NegMeanAbsoluteError => "neg_mean_absolute_error",
        }
    }

    /// Pick this scorer's value out of classification metrics.
    ///
    /// Regression scorers fall back to accuracy.
    #[must_use]
    pub fn pick_classification(self, m: &ClassificationMetrics) -> f64 {
        match self {
            Scoring::Precision => m.precision,
            Scoring::Recall => m.recall,
            Scoring::F1 => m.f1,
            _ => m.accuracy,
        }
    }

    /// Pick this scorer's value out of regression metrics.
    ///
    /// Classification scorers fall back to R².
    #[must_use]
    pub fn pick_regression(self, m: &RegressionMetrics) -> f64 {
        match self {
            Scoring::NegMeanSquaredError => -m.mse,
            Scoring::NegRootMeanSquaredError => -m.rmse,
            Scoring::NegMeanAbsoluteError => -m.mae,
            _ => m.r2,
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scorer name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scoring {0}")]
pub struct UnknownScoring(pub String);

impl FromStr for Scoring {
    type Err = UnknownScoring;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Scoring::Accuracy),
            "precision" => Ok(Scoring::Precision),
            "recall" => Ok(Scoring::Recall),
            "f1" => Ok(Scoring::F1),
            "r2" => Ok(Scoring::R2),
            "neg_mean_squared_error" => Ok(Scoring::NegMeanSquaredError),
            "neg_root_mean_squared_error" => Ok(Scoring::NegRootMeanSquaredError),
            "neg_mean_absolute_error" => Ok(Scoring::NegMeanAbsoluteError),
            other => Err(UnknownScoring(other.to_string())),
        }
    }
}
