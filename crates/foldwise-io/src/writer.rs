//! JSON report writer for cross-validation, tuning, training, and prediction.

use std::fs;
use std::path::{Path, PathBuf};

use foldwise_cv::{
    CandidateScore, CrossValidationRecord, ModelMetadata, ParamSet, Scoring, Task, TuningResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes run reports as pretty-printed JSON.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_cv.json`, `{experiment}_tuning.json`,
/// `{experiment}_metadata.json`, and `{experiment}_predictions.json`; the
/// model binary goes to [`ReportWriter::model_path`].
pub struct ReportWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ReportWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Return the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &ExperimentName {
        &self.experiment
    }

    /// Write a cross-validation report to `{experiment}_cv.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_cv(&self, summary: &RunSummary<'_>, result: &CrossValidationRecord) -> Result<PathBuf, IoError> {
        let artifact = CvArtifact {
            experiment: self.experiment.as_str(),
            summary,
            result,
        };
        self.write_json("cv", &artifact)
    }

    /// Write a grid-search report to `{experiment}_tuning.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_tuning<E>(&self, summary: &RunSummary<'_>, result: &TuningResult<E>) -> Result<PathBuf, IoError> {
        let artifact = TuningArtifact {
            experiment: self.experiment.as_str(),
            summary,
            scoring: result.scoring,
            cv: result.cv,
            n_candidates: result.n_candidates,
            best_params: &result.best_params,
            best_score: result.best_score,
            cv_results: &result.cv_results,
        };
        self.write_json("tuning", &artifact)
    }

    /// Write the training report to `{experiment}_metadata.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all)]
    pub fn write_training(&self, report: &TrainingReport) -> Result<PathBuf, IoError> {
        self.write_json("metadata", report)
    }

    /// Write predictions to `{experiment}_predictions.json`.
    ///
    /// `predictions` are class names for classifiers, values for regressors.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Encode`] or [`IoError::WriteFile`].
    #[instrument(skip_all, fields(n_samples = predictions.len()))]
    pub fn write_predictions<T: Serialize>(
        &self,
        model_name: &str,
        predictions: &[T],
        probabilities: Option<&[Vec<f64>]>,
        classes: Option<&[String]>,
    ) -> Result<PathBuf, IoError> {
        let artifact = PredictionsArtifact {
            experiment: self.experiment.as_str(),
            model: model_name,
            n_samples: predictions.len(),
            classes,
            predictions,
            probabilities,
        };
        self.write_json("predictions", &artifact)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything; just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }

    fn write_json<T: Serialize + ?Sized>(&self, suffix: &str, artifact: &T) -> Result<PathBuf, IoError> {
        let path = self
            .output_dir
            .join(format!("{}_{suffix}.json", self.experiment.as_str()));
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Encode {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, &json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "{suffix} report written");
        Ok(path)
    }
}

/// Dataset and model context shared by every report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    /// Estimator family.
    pub model_type: &'a str,
    /// Learning task.
    pub task: Task,
    /// Input CSV.
    pub data: &'a Path,
    /// Target column name.
    pub target: &'a str,
    /// Number of rows.
    pub n_samples: usize,
    /// Feature column names.
    pub feature_names: &'a [String],
}

/// Everything `predict` needs besides the model binary.
///
/// Written beside the model as `{experiment}_metadata.json` and read back
/// by [`read_training_report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Experiment name the model was trained under.
    pub experiment: String,
    /// Feature column names, in model input order.
    pub feature_names: Vec<String>,
    /// Target column name.
    pub target: String,
    /// Class names in label order; empty for regression.
    pub classes: Vec<String>,
    /// Estimator hyperparameters at fit time.
    pub params: ParamSet,
    /// Normalized importance per feature, descending.
    pub feature_importance: Vec<(String, f64)>,
    /// Full model metadata.
    pub metadata: ModelMetadata,
}

/// Read a [`TrainingReport`] written by [`ReportWriter::write_training`].
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] or [`IoError::JsonParse`].
pub fn read_training_report(path: &Path) -> Result<TrainingReport, IoError> {
    let text = fs::read_to_string(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| IoError::JsonParse {
        path: path.to_path_buf(),
        source: e,
    })
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct CvArtifact<'a> {
    experiment: &'a str,
    #[serde(flatten)]
    summary: &'a RunSummary<'a>,
    result: &'a CrossValidationRecord,
}

#[derive(Serialize)]
struct TuningArtifact<'a> {
    experiment: &'a str,
    #[serde(flatten)]
    summary: &'a RunSummary<'a>,
    scoring: Scoring,
    cv: usize,
    n_candidates: usize,
    best_params: &'a ParamSet,
    best_score: f64,
    cv_results: &'a [CandidateScore],
}

#[derive(Serialize)]
struct PredictionsArtifact<'a, T> {
    experiment: &'a str,
    model: &'a str,
    n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    classes: Option<&'a [String]>,
    predictions: &'a [T],
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<&'a [Vec<f64>]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldwise_cv::{ClassificationCvResult, ParamValue};
    use tempfile::TempDir;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn summary<'a>(names: &'a [String]) -> RunSummary<'a> {
        RunSummary {
            model_type: "tree_ensemble_classifier",
            task: Task::Classification,
            data: Path::new("iris.csv"),
            target: "species",
            n_samples: 150,
            feature_names: names,
        }
    }

    fn cv_record() -> CrossValidationRecord {
        CrossValidationRecord::Classification(ClassificationCvResult {
            accuracy_scores: vec![0.9, 1.0],
            precision_scores: vec![0.9, 1.0],
            recall_scores: vec![0.9, 1.0],
            f1_scores: vec![0.9, 1.0],
            mean_accuracy: 0.95,
            std_accuracy: 0.05,
            mean_precision: 0.95,
            std_precision: 0.05,
            mean_recall: 0.95,
            std_recall: 0.05,
            mean_f1: 0.95,
            std_f1: 0.05,
            cv_folds: 2,
        })
    }

    #[test]
    fn write_cv_json_structure() {
        let dir = TempDir::new().unwrap();
        let writer =
            ReportWriter::new(dir.path(), ExperimentName::new("iris".into()).unwrap()).unwrap();
        let names = vec!["a".to_string(), "b".to_string()];

        let path = writer.write_cv(&summary(&names), &cv_record()).unwrap();
        assert_eq!(path, dir.path().join("iris_cv.json"));

        let content = read_json(&path);
        assert_eq!(content["experiment"], "iris");
        assert_eq!(content["model_type"], "tree_ensemble_classifier");
        assert_eq!(content["task"], "classification");
        assert_eq!(content["n_samples"], 150);
        assert_eq!(content["feature_names"].as_array().unwrap().len(), 2);
        let result = &content["result"]["classification"];
        assert_eq!(result["cv_folds"], 2);
        assert_eq!(result["accuracy_scores"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn write_tuning_json_structure() {
        let dir = TempDir::new().unwrap();
        let writer =
            ReportWriter::new(dir.path(), ExperimentName::new("grid".into()).unwrap()).unwrap();
        let names = vec!["a".to_string()];
        let params: ParamSet = [("max_depth".to_string(), ParamValue::Null)].into_iter().collect();
        let result = TuningResult {
            best_params: params.clone(),
            best_score: 0.9,
            best_estimator: (),
            cv_results: vec![CandidateScore {
                params,
                split_scores: vec![0.8, 1.0],
                mean_score: 0.9,
                std_score: 0.1,
                rank: 1,
            }],
            scoring: Scoring::Accuracy,
            cv: 2,
            n_candidates: 1,
        };

        let path = writer.write_tuning(&summary(&names), &result).unwrap();
        let content = read_json(&path);
        assert_eq!(content["scoring"], "accuracy");
        assert_eq!(content["best_score"], 0.9);
        assert!(content["best_params"]["max_depth"].is_null());
        assert_eq!(content["cv_results"][0]["rank"], 1);
        assert_eq!(content["cv_results"][0]["split_scores"][1], 1.0);
    }

    #[test]
    fn write_predictions_with_classes() {
        let dir = TempDir::new().unwrap();
        let writer =
            ReportWriter::new(dir.path(), ExperimentName::new("p".into()).unwrap()).unwrap();
        let classes = vec!["no".to_string(), "yes".to_string()];
        let proba = vec![vec![0.2, 0.8], vec![0.6, 0.4]];

        let path = writer
            .write_predictions("m", &["yes", "no"], Some(proba.as_slice()), Some(classes.as_slice()))
            .unwrap();
        let content = read_json(&path);
        assert_eq!(content["n_samples"], 2);
        assert_eq!(content["predictions"][0], "yes");
        assert_eq!(content["probabilities"][1][0], 0.6);
        assert_eq!(content["classes"][1], "yes");
    }

    #[test]
    fn regression_predictions_omit_class_fields() {
        let dir = TempDir::new().unwrap();
        let writer =
            ReportWriter::new(dir.path(), ExperimentName::new("r".into()).unwrap()).unwrap();
        let path = writer.write_predictions("m", &[1.5, 2.5], None, None).unwrap();
        let content = read_json(&path);
        assert!(content.get("classes").is_none());
        assert!(content.get("probabilities").is_none());
        assert_eq!(content["predictions"][1], 2.5);
    }

    #[test]
    fn training_report_round_trip() {
        let dir = TempDir::new().unwrap();
        let writer =
            ReportWriter::new(dir.path(), ExperimentName::new("t".into()).unwrap()).unwrap();
        let report = TrainingReport {
            experiment: "t".into(),
            feature_names: vec!["a".into(), "b".into()],
            target: "y".into(),
            classes: vec!["x".into(), "z".into()],
            params: ParamSet::new(),
            feature_importance: vec![("b".into(), 0.7), ("a".into(), 0.3)],
            metadata: ModelMetadata::new("t", "neural_classifier", Task::Classification),
        };

        let path = writer.write_training(&report).unwrap();
        assert_eq!(path, dir.path().join("t_metadata.json"));
        let back = read_training_report(&path).unwrap();
        assert_eq!(back.classes, report.classes);
        assert_eq!(back.feature_importance, report.feature_importance);
        assert_eq!(back.metadata, report.metadata);
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("deep");
        let writer =
            ReportWriter::new(&nested, ExperimentName::new("n".into()).unwrap()).unwrap();
        assert_eq!(writer.model_path(), nested.join("n_model.bin"));
        assert!(nested.is_dir());
    }

    #[test]
    fn missing_report_is_file_not_found() {
        assert!(matches!(
            read_training_report(Path::new("/nonexistent/t_metadata.json")),
            Err(IoError::FileNotFound { .. })
        ));
    }
}
