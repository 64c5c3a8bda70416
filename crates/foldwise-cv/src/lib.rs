//! K-fold cross-validation and hyperparameter tuning for supervised models.
//!
//! Any type implementing [`Model`] can be cross-validated with
//! [`CrossValidation`]; a [`Tunable`] model can be grid-searched with
//! [`GridSearch`]. [`SupervisedModel`] adapts any [`Estimator`] to both,
//! records results in its [`ModelMetadata`], and persists via bincode.

mod confusion;
mod error;
mod estimator;
mod eval;
mod metadata;
mod metrics;
mod model;
mod params;
mod partition;
mod result;
mod serialize;
mod target;
mod tuning;

pub use confusion::{ClassScores, ConfusionMatrix, WeightedScores};
pub use error::{CvError, MetricsError, ModelError};
pub use estimator::{Estimator, validate_features, validate_rows, validate_training};
pub use eval::CrossValidation;
pub use metadata::{ModelMetadata, TrainingMetrics, TuningRecord};
pub use metrics::{
    ClassificationMetrics, MetricsRecord, RegressionMetrics, Scoring, UnknownScoring,
    evaluate_classification, evaluate_regression,
};
pub use model::{Model, SupervisedModel, Tunable};
pub use params::{ParamGrid, ParamSet, ParamValue};
pub use partition::{Fold, FoldPartitioner, Folds};
pub use result::{ClassificationCvResult, CrossValidationRecord, RegressionCvResult, mean_std};
pub use target::{Target, Task};
pub use tuning::{CandidateScore, GridSearch, TuningResult, resolve_n_jobs};
