//! Confusion matrix with per-class and support-weighted scores.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::MetricsError;

/// A confusion matrix for multi-class classification.
///
/// Rows and columns run over the sorted union of labels observed in
/// either vector, so entry `matrix[i][j]` counts samples whose true label
/// is `labels()[i]` and whose predicted label is `labels()[j]`. Labels
/// need not be contiguous.
#[derive(Debug, Clone, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<usize>,
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, Serialize)]
pub struct ClassScores {
    /// The class label.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true samples for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

/// Precision, recall, and F1 averaged across classes, weighted by support.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedScores {
    /// Support-weighted precision.
    pub precision: f64,
    /// Support-weighted recall.
    pub recall: f64,
    /// Support-weighted F1.
    pub f1: f64,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`MetricsError::EmptyInput`] | Zero labels provided |
    /// | [`MetricsError::LengthMismatch`] | Label vectors differ in length |
    pub fn from_labels(true_labels: &[usize], predicted: &[usize]) -> Result<Self, MetricsError> {
        if true_labels.len() != predicted.len() {
            return Err(MetricsError::LengthMismatch {
                n_true: true_labels.len(),
                n_pred: predicted.len(),
            });
        }
        if true_labels.is_empty() {
            return Err(MetricsError::EmptyInput);
        }
        let labels: Vec<usize> = true_labels
            .iter()
            .chain(predicted)
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n_classes = labels.len();
        let position = |label: &usize| labels.binary_search(label).unwrap_or_default();
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (t, p) in true_labels.iter().zip(predicted) {
            matrix[position(t)][position(p)] += 1;
        }
        Ok(Self {
            labels,
            matrix,
            n_classes,
        })
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Per-class precision, recall, F1, and support.
    ///
    /// A class with no predictions or no true samples scores 0.0 instead of
    /// dividing by zero.
    #[must_use]
    pub fn class_scores(&self) -> Vec<ClassScores> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted: usize = (0..self.n_classes).map(|i| self.matrix[i][c]).sum();
                let support: usize = self.matrix[c].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassScores {
                    class: self.labels[c],
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Precision, recall, and F1 averaged over classes, weighted by true support.
    ///
    /// Classes that only appear among the predictions carry zero weight.
    #[must_use]
    pub fn weighted(&self) -> WeightedScores {
        let total = self.total();
        if total == 0 {
            return WeightedScores {
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
            };
        }
        let mut acc = WeightedScores {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        };
        for s in self.class_scores() {
            let w = s.support as f64;
            acc.precision += w * s.precision;
            acc.recall += w * s.recall;
            acc.f1 += w * s.f1;
        }
        let n = total as f64;
        WeightedScores {
            precision: acc.precision / n,
            recall: acc.recall / n,
            f1: acc.f1 / n,
        }
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of distinct labels observed.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the sorted labels that index the rows and columns.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn total(&self) -> usize {
        self.matrix.iter().flat_map(|row| row.iter()).sum()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for label in &self.labels {
            write!(f, " pred_{label:>3}")?;
        }
        writeln!(f)?;

        for (label, row) in self.labels.iter().zip(&self.matrix) {
            write!(f, "true_{label:>3}")?;
            for val in row {
                write!(f, " {val:>7}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let labels = vec![0, 0, 1, 1, 2, 2];
        let cm = ConfusionMatrix::from_labels(&labels, &labels).unwrap();
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);

        let w = cm.weighted();
        assert!((w.precision - 1.0).abs() < f64::EPSILON);
        assert!((w.recall - 1.0).abs() < f64::EPSILON);
        assert!((w.f1 - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn known_confusion_matrix() {
        // True: [0,0,0, 1,1,1, 2,2,2]
        // Pred: [0,0,1, 1,1,2, 2,2,0]
        let true_labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let predicted = vec![0, 0, 1, 1, 1, 2, 2, 2, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted).unwrap();

        let scores = cm.class_scores();
        assert!((scores[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((scores[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(scores[0].support, 3);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-10);
    }

    #[test]
    fn weighted_scores_follow_support() {
        // Class 0 support 3 (2 correct, 1 predicted as 1); class 1 support 1 (correct).
        let true_labels = vec![0, 0, 0, 1];
        let predicted = vec![0, 0, 1, 1];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted).unwrap();
        let w = cm.weighted();

        // precision: class0 = 2/2 = 1.0, class1 = 1/2 = 0.5 -> (3*1.0 + 1*0.5)/4
        assert!((w.precision - 0.875).abs() < 1e-10);
        // recall: class0 = 2/3, class1 = 1.0 -> (3*2/3 + 1)/4 = 0.75
        assert!((w.recall - 0.75).abs() < 1e-10);
        // f1: class0 = 0.8, class1 = 2/3 -> (3*0.8 + 2/3)/4
        let expected_f1 = (3.0 * 0.8 + 2.0 / 3.0) / 4.0;
        assert!((w.f1 - expected_f1).abs() < 1e-10);
    }

    #[test]
    fn predicted_only_class_has_zero_weight() {
        // Class 2 never occurs in the truth but is predicted once.
        let true_labels = vec![0, 1, 1];
        let predicted = vec![2, 1, 1];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted).unwrap();
        assert_eq!(cm.n_classes(), 3);

        let scores = cm.class_scores();
        assert_eq!(scores[2].support, 0);
        assert!((scores[0].precision - 0.0).abs() < f64::EPSILON);

        // Only class 1 (support 2) scores; class 0 (support 1) contributes 0.
        let w = cm.weighted();
        assert!((w.recall - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn non_contiguous_labels_index_by_union() {
        // Label 3: support 1, predicted twice (1 correct).
        // Label 7: support 2, predicted once (1 correct).
        let true_labels = vec![3, 7, 7];
        let predicted = vec![3, 3, 7];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted).unwrap();

        assert_eq!(cm.n_classes(), 2);
        assert_eq!(cm.labels(), &[3, 7]);
        assert_eq!(cm.as_rows(), &[vec![1usize, 0], vec![1, 1]]);
        assert!((cm.accuracy() - 2.0 / 3.0).abs() < 1e-10);

        let scores = cm.class_scores();
        assert_eq!(scores[0].class, 3);
        assert_eq!(scores[1].class, 7);

        // precision: 3 -> 1/2, 7 -> 1/1; weighted (1*0.5 + 2*1.0)/3
        // recall:    3 -> 1/1, 7 -> 1/2; weighted (1*1.0 + 2*0.5)/3
        // f1:        both 2/3;           weighted 2/3
        let w = cm.weighted();
        assert!((w.precision - 2.5 / 3.0).abs() < 1e-10);
        assert!((w.recall - 2.0 / 3.0).abs() < 1e-10);
        assert!((w.f1 - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn extreme_labels_do_not_size_the_matrix() {
        let cm = ConfusionMatrix::from_labels(&[0, usize::MAX], &[0, usize::MAX]).unwrap();
        assert_eq!(cm.n_classes(), 2);
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);

        let cm = ConfusionMatrix::from_labels(&[0, 50_000], &[50_000, 50_000]).unwrap();
        assert_eq!(cm.as_rows(), &[vec![0usize, 1], vec![0, 1]]);
        assert!(format!("{cm}").contains("true_50000"));
    }

    #[test]
    fn empty_labels_error() {
        let err = ConfusionMatrix::from_labels(&[], &[]).unwrap_err();
        assert_eq!(err, MetricsError::EmptyInput);
    }

    #[test]
    fn length_mismatch_error() {
        let err = ConfusionMatrix::from_labels(&[0, 1], &[0]).unwrap_err();
        assert_eq!(err, MetricsError::LengthMismatch { n_true: 2, n_pred: 1 });
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1]).unwrap();
        let output = format!("{cm}");
        assert!(output.contains("pred_"));
        assert!(output.contains("true_"));
    }

    #[test]
    fn as_rows_returns_matrix() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1], &[0, 1, 0, 1]).unwrap();
        let rows = cm.as_rows();
        assert_eq!(rows[0], vec![1, 1]);
        assert_eq!(rows[1], vec![1, 1]);
    }
}
