//! Cross-validation result types.

use serde::{Deserialize, Serialize};

use crate::metrics::{ClassificationMetrics, RegressionMetrics};

/// Per-fold classification scores with their mean and population std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationCvResult {
    /// Accuracy of each fold, in fold order.
    pub accuracy_scores: Vec<f64>,
    /// Weighted precision of each fold.
    pub precision_scores: Vec<f64>,
    /// Weighted recall of each fold.
    pub recall_scores: Vec<f64>,
    /// Weighted F1 of each fold.
    pub f1_scores: Vec<f64>,
    /// Mean accuracy across folds.
    pub mean_accuracy: f64,
    /// Population std of fold accuracies.
    pub std_accuracy: f64,
    /// Mean precision across folds.
    pub mean_precision: f64,
    /// Population std of fold precisions.
    pub std_precision: f64,
    /// Mean recall across folds.
    pub mean_recall: f64,
    /// Population std of fold recalls.
    pub std_recall: f64,
    /// Mean F1 across folds.
    pub mean_f1: f64,
    /// Population std of fold F1 scores.
    pub std_f1: f64,
    /// Number of folds.
    pub cv_folds: usize,
}

/// Per-fold regression scores with their mean and population std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionCvResult {
    /// MSE of each fold, in fold order.
    pub mse_scores: Vec<f64>,
    /// RMSE of each fold.
    pub rmse_scores: Vec<f64>,
    /// MAE of each fold.
    pub mae_scores: Vec<f64>,
    /// R² of each fold.
    pub r2_scores: Vec<f64>,
    /// Mean MSE across folds.
    pub mean_mse: f64,
    /// Population std of fold MSEs.
    pub std_mse: f64,
    /// Mean RMSE across folds.
    pub mean_rmse: f64,
    /// Population std of fold RMSEs.
    pub std_rmse: f64,
    /// Mean MAE across folds.
    pub mean_mae: f64,
    /// Population std of fold MAEs.
    pub std_mae: f64,
    /// Mean R² across folds.
    pub mean_r2: f64,
    /// Population std of fold R² values.
    pub std_r2: f64,
    /// Number of folds.
    pub cv_folds: usize,
}

/// The latest cross-validation result, as stored in model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidationRecord {
    /// Result of a classification run.
    Classification(ClassificationCvResult),
    /// Result of a regression run.
    Regression(RegressionCvResult),
}

/// Mean and population standard deviation (divide by `n`).
///
/// Returns `(0.0, 0.0)` for an empty slice.
#[must_use]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl ClassificationCvResult {
    pub(crate) fn from_folds(folds: &[ClassificationMetrics]) -> Self {
        let accuracy_scores: Vec<f64> = folds.iter().map(|m| m.accuracy).collect();
        let precision_scores: Vec<f64> = folds.iter().map(|m| m.precision).collect();
        let recall_scores: Vec<f64> = folds.iter().map(|m| m.recall).collect();
        let f1_scores: Vec<f64> = folds.iter().map(|m| m.f1).collect();

        let (mean_accuracy, std_accuracy) = mean_std(&accuracy_scores);
        let (mean_precision, std_precision) = mean_std(&precision_scores);
        let (mean_recall, std_recall) = mean_std(&recall_scores);
        let (mean_f1, std_f1) = mean_std(&f1_scores);

        Self {
            accuracy_scores,
            precision_scores,
            recall_scores,
            f1_scores,
            mean_accuracy,
            std_accuracy,
            mean_precision,
            std_precision,
            mean_recall,
            std_recall,
            mean_f1,
            std_f1,
            cv_folds: folds.len(),
        }
    }
}

impl RegressionCvResult {
    pub(crate) fn from_folds(folds: &[RegressionMetrics]) -> Self {
        let mse_scores: Vec<f64> = folds.iter().map(|m| m.mse).collect();
        let rmse_scores: Vec<f64> = folds.iter().map(|m| m.rmse).collect();
        let mae_scores: Vec<f64> = folds.iter().map(|m| m.mae).collect();
        let r2_scores: Vec<f64> = folds.iter().map(|m| m.r2).collect();

        let (mean_mse, std_mse) = mean_std(&mse_scores);
        let (mean_rmse, std_rmse) = mean_std(&rmse_scores);
        let (mean_mae, std_mae) = mean_std(&mae_scores);
        let (mean_r2, std_r2) = mean_std(&r2_scores);

        Self {
            mse_scores,
            rmse_scores,
            mae_scores,
            r2_scores,
            mean_mse,
            std_mse,
            mean_rmse,
            std_rmse,
            mean_mae,
            std_mae,
            mean_r2,
            std_r2,
            cv_folds: folds.len(),
        }
    }
}
