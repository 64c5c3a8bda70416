use std::path::PathBuf;

/// Errors raised by a model or estimator while training or predicting.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Returned when `predict`, `predict_proba`, or an evaluation runs before any successful train.
    #[error("model {name} has not been trained")]
    UntrainedModel {
        /// Name of the model that was used untrained.
        name: String,
    },

    /// Returned when a training or prediction batch has zero samples.
    #[error("dataset has zero samples")]
    EmptyDataset,

    /// Returned when a model is trained or used without an estimator installed.
    #[error("model {name} holds no estimator")]
    NoEstimator {
        /// Name of the model.
        name: String,
    },

    /// Returned when the rows of a batch have zero feature columns.
    #[error("dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a row has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the row.
        got: usize,
        /// The zero-based index of the offending row.
        sample_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending row.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when the target vector length differs from the number of rows.
    #[error("got {n_targets} targets for {n_samples} samples")]
    TargetLengthMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of target values.
        n_targets: usize,
    },

    /// Returned when `set_param` names a hyperparameter the estimator does not have.
    #[error("estimator {estimator} has no hyperparameter named {name}")]
    UnknownParam {
        /// Estimator kind.
        estimator: &'static str,
        /// The unknown parameter name.
        name: String,
    },

    /// Returned when a hyperparameter value has the wrong type or is out of range.
    #[error("invalid value {value} for hyperparameter {name}: {reason}")]
    InvalidParamValue {
        /// The parameter name.
        name: String,
        /// The rejected value, rendered for display.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Returned when class probabilities are requested from a regression estimator.
    #[error("estimator {estimator} does not produce class probabilities")]
    ProbabilitiesUnsupported {
        /// Estimator kind.
        estimator: &'static str,
    },

    /// Returned when the validation split is not in [0.0, 1.0).
    #[error("validation_split must be in [0.0, 1.0), got {split}")]
    InvalidValidationSplit {
        /// The rejected split fraction.
        split: f64,
    },

    /// Returned when the validation split leaves no rows to train on.
    #[error("validation_split {split} leaves no training rows out of {n_samples}")]
    NoTrainingRows {
        /// The split fraction.
        split: f64,
        /// Total number of rows.
        n_samples: usize,
    },

    /// Wraps a metric failure raised while scoring a training run.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Errors from metric evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// Returned when truth and prediction vectors are empty.
    #[error("cannot evaluate metrics on zero samples")]
    EmptyInput,

    /// Returned when truth and prediction vectors have different lengths.
    #[error("y_true has {n_true} values but y_pred has {n_pred}")]
    LengthMismatch {
        /// Length of the truth vector.
        n_true: usize,
        /// Length of the prediction vector.
        n_pred: usize,
    },
}

/// Errors from cross-validation, tuning, and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum CvError {
    /// Returned when the fold count is less than 2.
    #[error("cv must be at least 2, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid fold count provided.
        n_folds: usize,
    },

    /// Returned when there are fewer samples than folds.
    #[error("cannot split {n_samples} samples into {n_folds} folds")]
    InsufficientData {
        /// Number of samples available.
        n_samples: usize,
        /// Requested number of folds.
        n_folds: usize,
    },

    /// Returned when the label vector used for stratification has the wrong length.
    #[error("stratification labels have length {n_labels}, expected {n_samples}")]
    StratificationMismatch {
        /// Number of samples being partitioned.
        n_samples: usize,
        /// Number of labels supplied.
        n_labels: usize,
    },

    /// Returned when feature rows and targets disagree in length before any fold runs.
    #[error("got {n_targets} targets for {n_samples} samples")]
    TargetLengthMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of target values.
        n_targets: usize,
    },

    /// Returned when tuning is requested but the model holds no estimator.
    #[error("model {name} holds no estimator to tune")]
    MissingEstimator {
        /// Name of the model.
        name: String,
    },

    /// Returned when any step of a fold's train/predict/evaluate cycle fails.
    #[error("fold {fold} failed")]
    FoldExecution {
        /// Zero-based fold index.
        fold: usize,
        /// The underlying model or metric failure.
        source: ModelError,
    },

    /// Returned when grid search fails while fitting or scoring a candidate.
    #[error("candidate {candidate} failed on fold {fold}")]
    CandidateExecution {
        /// Zero-based candidate index in grid order.
        candidate: usize,
        /// Zero-based fold index.
        fold: usize,
        /// The underlying model or metric failure.
        source: ModelError,
    },

    /// Returned when a candidate's parameters cannot be applied to the estimator.
    #[error("candidate {candidate} has invalid parameters")]
    CandidateParams {
        /// Zero-based candidate index in grid order.
        candidate: usize,
        /// The rejected parameter.
        source: ModelError,
    },

    /// Wraps a model failure outside a fold loop (e.g. refitting the best estimator).
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Wraps a metric failure outside a fold loop.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Returned when a scoring name is unknown or does not fit the task.
    #[error("scoring {scoring} is not valid for {task} models")]
    InvalidScoring {
        /// The scoring name.
        scoring: String,
        /// The task of the model being tuned.
        task: String,
    },

    /// Returned when a parameter grid axis has no candidate values.
    #[error("parameter grid axis {name} has no candidate values")]
    EmptyParamGrid {
        /// The empty axis.
        name: String,
    },

    /// Returned when `n_jobs` is zero or asks for fewer than one worker.
    #[error("n_jobs {n_jobs} does not resolve to at least one worker")]
    InvalidParallelism {
        /// The rejected `n_jobs` value.
        n_jobs: i32,
    },

    /// Returned when the grid-search worker pool cannot be built.
    #[error("failed to build worker pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },
}
