use rand::Rng;

use crate::node::FeatureIndex;

/// Node statistics and impurity for one kind of target.
///
/// Split finding moves samples one at a time from the right child to the
/// left, so statistics must support incremental add and remove.
pub(crate) trait Criterion {
    /// Sufficient statistics of a set of samples.
    type Stats: Clone;

    /// Statistics of the empty set.
    fn empty(&self) -> Self::Stats;

    /// Add sample `si` to `stats`.
    fn add(&self, stats: &mut Self::Stats, si: usize);

    /// Remove sample `si` from `stats`.
    fn remove(&self, stats: &mut Self::Stats, si: usize);

    /// Impurity of a node holding `n` samples with these statistics.
    fn impurity(&self, stats: &Self::Stats, n: usize) -> f64;

    /// Leaf output for a node holding `n` samples.
    fn leaf_output(&self, stats: &Self::Stats, n: usize) -> Vec<f64>;

    /// Statistics of the samples at `indices`.
    fn stats_of(&self, indices: &[usize]) -> Self::Stats {
        let mut stats = self.empty();
        for &si in indices {
            self.add(&mut stats, si);
        }
        stats
    }
}

/// Gini impurity over integer class labels: `1 - Σ p_i²`.
pub(crate) struct Gini<'a> {
    pub(crate) labels: &'a [usize],
    pub(crate) n_classes: usize,
}

impl Criterion for Gini<'_> {
    type Stats = Vec<usize>;

    fn empty(&self) -> Vec<usize> {
        vec![0; self.n_classes]
    }

    fn add(&self, stats: &mut Vec<usize>, si: usize) {
        stats[self.labels[si]] += 1;
    }

    fn remove(&self, stats: &mut Vec<usize>, si: usize) {
        stats[self.labels[si]] -= 1;
    }

    fn impurity(&self, stats: &Vec<usize>, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        1.0 - stats
            .iter()
            .map(|&c| {
                let p = c as f64 / n;
                p * p
            })
            .sum::<f64>()
    }

    fn leaf_output(&self, stats: &Vec<usize>, n: usize) -> Vec<f64> {
        let total = n.max(1) as f64;
        stats.iter().map(|&c| c as f64 / total).collect()
    }
}

/// Variance of continuous targets (mean squared deviation).
pub(crate) struct Variance<'a> {
    pub(crate) values: &'a [f64],
}

/// Running sum and sum of squares.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Moments {
    sum: f64,
    sum_sq: f64,
}

impl Criterion for Variance<'_> {
    type Stats = Moments;

    fn empty(&self) -> Moments {
        Moments::default()
    }

    fn add(&self, stats: &mut Moments, si: usize) {
        let v = self.values[si];
        stats.sum += v;
        stats.sum_sq += v * v;
    }

    fn remove(&self, stats: &mut Moments, si: usize) {
        let v = self.values[si];
        stats.sum -= v;
        stats.sum_sq -= v * v;
    }

    fn impurity(&self, stats: &Moments, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let mean = stats.sum / n;
        (stats.sum_sq / n - mean * mean).max(0.0)
    }

    fn leaf_output(&self, stats: &Moments, n: usize) -> Vec<f64> {
        vec![stats.sum / n.max(1) as f64]
    }
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    /// Weighted impurity decrease: `n·I(parent) − n_l·I(left) − n_r·I(right)`.
    pub(crate) impurity_decrease: f64,
    pub(crate) left_indices: Vec<usize>,
    pub(crate) right_indices: Vec<usize>,
}

/// Find the best split among a random subset of `max_features` features.
///
/// For each chosen feature, sorts the node's samples by value and scans
/// left to right with incremental statistics. Returns `None` when no split
/// separates distinct values while leaving `min_samples_leaf` on each side,
/// or when no split lowers impurity.
///
/// `columns` is column-major: `columns[feature][sample]`.
pub(crate) fn find_best_split<C: Criterion>(
    columns: &[Vec<f64>],
    criterion: &C,
    sample_indices: &[usize],
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_features = columns.len();
    let n_samples = sample_indices.len();
    if n_samples < 2 || n_features == 0 {
        return None;
    }

    let parent = criterion.stats_of(sample_indices);
    let parent_impurity = criterion.impurity(&parent, n_samples);

    // Partial Fisher-Yates: shuffle only the first `max_features` positions.
    let mut feature_order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        feature_order.swap(i, j);
    }

    let mut best_decrease = 0.0f64;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for &feat_idx in &feature_order[..take] {
        let col = &columns[feat_idx];
        let mut sorted: Vec<(f64, usize)> = sample_indices.iter().map(|&si| (col[si], si)).collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = criterion.empty();
        let mut right = parent.clone();

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            criterion.add(&mut left, si);
            criterion.remove(&mut right, si);

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            let val_next = sorted[i + 1].0;
            if val_i == val_next || n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let decrease = n_samples as f64 * parent_impurity
                - n_left as f64 * criterion.impurity(&left, n_left)
                - n_right as f64 * criterion.impurity(&right, n_right);

            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), (val_i + val_next) / 2.0));
            }
        }
    }

    let (feature, threshold) = best?;
    let col = &columns[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
        sample_indices.iter().partition(|&&si| col[si] <= threshold);

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: best_decrease,
        left_indices,
        right_indices,
    })
}
