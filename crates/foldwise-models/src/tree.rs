use rand::Rng;
use tracing::trace;

use crate::node::{Node, NodeIndex};
use crate::split::{Criterion, find_best_split};

/// Growth limits for a single tree, already resolved against the data.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeConfig {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    /// Features examined per split, in `1..=n_features`.
    pub(crate) max_features: usize,
}

/// A fitted CART tree stored as a flat arena rooted at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Grow a tree on `sample_indices` (which may repeat, as in a bootstrap).
    ///
    /// `columns` is column-major over the full training set.
    pub(crate) fn grow<C: Criterion>(
        columns: &[Vec<f64>],
        criterion: &C,
        sample_indices: &[usize],
        config: &TreeConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let mut arena = Vec::new();
        let mut builder = Builder {
            columns,
            criterion,
            config,
            arena: &mut arena,
        };
        let root = builder.build(sample_indices, 0, rng);
        trace!(
            n_nodes = arena.len(),
            n_samples = arena[root.index()].n_samples(),
            "tree grown"
        );
        Self {
            nodes: arena,
            n_features: columns.len(),
        }
    }

    /// Leaf output reached by `sample`.
    ///
    /// Goes left when `sample[feature] <= threshold`. The caller guarantees
    /// `sample.len() == n_features`.
    pub(crate) fn leaf_output(&self, sample: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
                Node::Leaf { output, .. } => return output,
            }
        }
    }

    /// Mean Decrease in Impurity, normalized to sum to 1.0.
    ///
    /// All zeros when the tree is a single leaf.
    pub(crate) fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            for v in &mut totals {
                *v /= sum;
            }
        }
        totals
    }

    pub(crate) fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, left.index()).max(walk(nodes, right.index()))
                }
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}

struct Builder<'a, C> {
    columns: &'a [Vec<f64>],
    criterion: &'a C,
    config: &'a TreeConfig,
    arena: &'a mut Vec<Node>,
}

impl<C: Criterion> Builder<'_, C> {
    fn build(&mut self, sample_indices: &[usize], depth: usize, rng: &mut impl Rng) -> NodeIndex {
        let n_samples = sample_indices.len();
        let stats = self.criterion.stats_of(sample_indices);
        let impurity = self.criterion.impurity(&stats, n_samples);

        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split;
        let pure = impurity <= 0.0;

        let split = if too_few || pure || depth_exceeded {
            None
        } else {
            find_best_split(
                self.columns,
                self.criterion,
                sample_indices,
                self.config.max_features,
                self.config.min_samples_leaf,
                rng,
            )
        };

        let Some(split) = split else {
            let idx = self.arena.len();
            self.arena.push(Node::Leaf {
                output: self.criterion.leaf_output(&stats, n_samples),
                impurity,
                n_samples,
            });
            return NodeIndex::new(idx);
        };

        // Reserve the slot so children get higher indices, then overwrite.
        let node_idx = self.arena.len();
        self.arena.push(Node::Leaf {
            output: Vec::new(),
            impurity,
            n_samples,
        });

        let left = self.build(&split.left_indices, depth + 1, rng);
        let right = self.build(&split.right_indices, depth + 1, rng);

        self.arena[node_idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };
        NodeIndex::new(node_idx)
    }
}
