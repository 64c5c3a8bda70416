//! Flat tree storage: nodes live in a `Vec` and refer to each other by index.

use serde::{Deserialize, Serialize};

/// Column of the feature matrix a split tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(column: usize) -> Self {
        Self(column)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Position of a node in its tree's node vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(position: usize) -> Self {
        Self(position)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Node {
    Split {
        feature: FeatureIndex,
        /// Rows with `x[feature] <= threshold` descend left.
        threshold: f64,
        left: NodeIndex,
        right: NodeIndex,
        n_samples: usize,
        /// `n·I(parent) − n_l·I(left) − n_r·I(right)`, summed into MDI.
        impurity_decrease: f64,
    },
    Leaf {
        /// Class frequencies for classifiers, `[mean]` for regressors.
        output: Vec<f64>,
        impurity: f64,
        n_samples: usize,
    },
}

impl Node {
    /// Training rows that reached this node.
    pub(crate) fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }
}
