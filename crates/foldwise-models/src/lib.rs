//! Concrete estimators for the foldwise engine.
//!
//! Each type implements [`foldwise_cv::Estimator`], so it can be wrapped in a
//! [`foldwise_cv::SupervisedModel`], cross-validated, grid-searched by
//! parameter name, and saved with bincode.
//!
//! - [`TreeEnsembleClassifier`] / [`TreeEnsembleRegressor`]: bagged CART
//!   trees grown in parallel with rayon, with MDI feature importances.
//! - [`NeuralClassifier`] / [`NeuralRegressor`]: one tanh hidden layer
//!   trained by full-batch gradient descent on standardized inputs.

mod classes;
mod config;
mod forest;
mod neural;
mod node;
mod split;
mod tree;

pub use config::{EnsembleConfig, MaxFeatures};
pub use forest::{TreeEnsembleClassifier, TreeEnsembleRegressor};
pub use neural::{NeuralClassifier, NeuralConfig, NeuralRegressor};
