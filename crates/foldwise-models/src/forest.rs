//! Bagged CART ensembles with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use foldwise_cv::{
    Estimator, ModelError, ParamSet, ParamValue, validate_rows, validate_training,
};

use crate::classes::ClassIndex;
use crate::config::EnsembleConfig;
use crate::split::{Criterion, Gini, Variance};
use crate::tree::{DecisionTree, TreeConfig};

/// Trees of one fitted ensemble, all grown on the same column count.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Forest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    /// Length of every leaf output: the class count, or 1 for regression.
    pub(crate) n_outputs: usize,
}

impl Forest {
    /// Grow `config.n_trees` trees, each on a bootstrap sample.
    ///
    /// Per-tree seeds are drawn from a master RNG before the parallel
    /// section, so the result does not depend on scheduling.
    #[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = n_samples))]
    fn grow<C: Criterion + Sync>(
        config: &EnsembleConfig,
        features: &[Vec<f64>],
        criterion: &C,
        n_samples: usize,
        n_outputs: usize,
    ) -> Result<Self, ModelError> {
        let n_features = features.first().map_or(0, Vec::len);
        let tree_config = TreeConfig {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features.resolve(n_features)?,
        };

        info!(
            n_trees = config.n_trees,
            n_samples,
            n_features,
            n_outputs,
            max_features = tree_config.max_features,
            "training tree ensemble"
        );

        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

        let trees: Vec<DecisionTree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                DecisionTree::grow(&columns, criterion, &bootstrap, &tree_config, &mut rng)
            })
            .collect();

        debug!(
            n_trees_trained = trees.len(),
            max_depth_reached = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            "tree ensemble trained"
        );

        Ok(Self {
            trees,
            n_features,
            n_outputs,
        })
    }

    /// Average leaf output over all trees, one vector per row.
    fn mean_outputs(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        validate_rows(features, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(features
            .iter()
            .map(|row| {
                let mut acc = vec![0.0; self.n_outputs];
                for tree in &self.trees {
                    for (a, v) in acc.iter_mut().zip(tree.leaf_output(row)) {
                        *a += v;
                    }
                }
                for a in &mut acc {
                    *a /= n_trees;
                }
                acc
            })
            .collect())
    }

    /// Per-tree MDI averaged over the ensemble, normalized to sum to 1.0.
    fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (t, v) in totals.iter_mut().zip(tree.feature_importances()) {
                *t += v;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            for t in &mut totals {
                *t /= sum;
            }
        }
        totals
    }
}

/// Index of the largest value; the lowest index wins ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Random-forest classifier: bootstrap-bagged CART trees split on Gini
/// impurity, voting by averaged leaf class distributions.
///
/// Tunable parameters: `n_trees`, `max_depth`, `min_samples_split`,
/// `min_samples_leaf`, `max_features` (`"sqrt"`, `"all"`, or a count),
/// and `seed`.
///
/// Labels may be any `usize` values. `predict_proba` has one column per
/// distinct label in the training set, ordered as in
/// [`TreeEnsembleClassifier::classes`]; a label absent from one fold's
/// training slice has no column in that fold's model.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TreeEnsembleClassifier {
    config: EnsembleConfig,
    classes: ClassIndex,
    forest: Option<Forest>,
}

impl TreeEnsembleClassifier {
    /// Create an unfitted classifier.
    #[must_use]
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            classes: ClassIndex::default(),
            forest: None,
        }
    }

    /// Return the current configuration.
    #[must_use]
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Number of distinct labels seen at fit time, if fitted.
    #[must_use]
    pub fn n_classes(&self) -> Option<usize> {
        self.forest.as_ref().map(|f| f.n_outputs)
    }

    /// Sorted labels seen at fit time; column `j` of `predict_proba`
    /// scores `classes()[j]`. Empty before fitting.
    #[must_use]
    pub fn classes(&self) -> &[usize] {
        self.classes.labels()
    }

    fn fitted(&self) -> Result<&Forest, ModelError> {
        self.forest.as_ref().ok_or_else(|| ModelError::UntrainedModel {
            name: self.kind().to_string(),
        })
    }
}

impl Estimator for TreeEnsembleClassifier {
    type Target = usize;

    fn kind(&self) -> &'static str {
        "tree_ensemble_classifier"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[usize]) -> Result<(), ModelError> {
        validate_training(features, targets)?;
        self.config.validate()?;
        self.forest = None;

        let (classes, encoded) = ClassIndex::fit(targets);
        let gini = Gini {
            labels: &encoded,
            n_classes: classes.len(),
        };
        let forest = Forest::grow(&self.config, features, &gini, targets.len(), classes.len())?;
        debug!(n_classes = classes.len(), "class labels indexed");
        self.classes = classes;
        self.forest = Some(forest);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, ModelError> {
        let proba = self.fitted()?.mean_outputs(features)?;
        Ok(proba.iter().map(|p| self.classes.label(argmax(p))).collect())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.fitted()?.mean_outputs(features)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        let kind = self.kind();
        self.config.set(kind, name, value)
    }

    fn params(&self) -> ParamSet {
        self.config.params()
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.forest.as_ref().map(Forest::feature_importances)
    }
}

/// Random-forest regressor: bootstrap-bagged CART trees split on variance
/// reduction, predicting the mean of the leaf means.
///
/// Takes the same tunable parameters as [`TreeEnsembleClassifier`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TreeEnsembleRegressor {
    config: EnsembleConfig,
    forest: Option<Forest>,
}

impl TreeEnsembleRegressor {
    /// Create an unfitted regressor.
    #[must_use]
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            forest: None,
        }
    }

    /// Return the current configuration.
    #[must_use]
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }
}

impl Estimator for TreeEnsembleRegressor {
    type Target = f64;

    fn kind(&self) -> &'static str {
        "tree_ensemble_regressor"
    }

    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), ModelError> {
        validate_training(features, targets)?;
        self.config.validate()?;
        self.forest = None;

        let variance = Variance { values: targets };
        self.forest = Some(Forest::grow(
            &self.config,
            features,
            &variance,
            targets.len(),
            1,
        )?);
        Ok(())
    }

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let forest = self.forest.as_ref().ok_or_else(|| ModelError::UntrainedModel {
            name: self.kind().to_string(),
        })?;
        Ok(forest
            .mean_outputs(features)?
            .into_iter()
            .map(|out| out[0])
            .collect())
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        let kind = self.kind();
        self.config.set(kind, name, value)
    }

    fn params(&self) -> ParamSet {
        self.config.params()
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.forest.as_ref().map(Forest::feature_importances)
    }
}
