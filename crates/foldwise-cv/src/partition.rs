//! K-fold partitioning, plain or stratified by class label.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::CvError;

/// One train/validation split of a k-fold partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Zero-based fold index.
    pub fold_idx: usize,
    /// Rows to train on, ascending.
    pub train_indices: Vec<usize>,
    /// Held-out rows, ascending.
    pub validation_indices: Vec<usize>,
}

/// Builds k-fold partitions.
///
/// Construct via [`FoldPartitioner::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `seed`    | 42      |
/// | `shuffle` | `true`  |
#[derive(Debug, Clone)]
pub struct FoldPartitioner {
    n_folds: usize,
    seed: u64,
    shuffle: bool,
}

impl FoldPartitioner {
    /// Create a partitioner for `n_folds` folds.
    ///
    /// # Errors
    ///
    /// Returns [`CvError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, CvError> {
        if n_folds < 2 {
            return Err(CvError::InvalidFoldCount { n_folds });
        }
        Ok(Self {
            n_folds,
            seed: 42,
            shuffle: true,
        })
    }

    /// Set the shuffle seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Shuffle rows before dealing them into folds.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Partition `n_samples` rows, stratifying on `strata` when given.
    ///
    /// The same inputs always produce the same folds.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::InsufficientData`] | `n_samples < n_folds` |
    /// | [`CvError::StratificationMismatch`] | `strata.len() != n_samples` |
    pub fn split(&self, n_samples: usize, strata: Option<&[usize]>) -> Result<Folds, CvError> {
        if n_samples < self.n_folds {
            return Err(CvError::InsufficientData {
                n_samples,
                n_folds: self.n_folds,
            });
        }
        let assignments = match strata {
            Some(labels) => {
                if labels.len() != n_samples {
                    return Err(CvError::StratificationMismatch {
                        n_samples,
                        n_labels: labels.len(),
                    });
                }
                self.stratified_assignments(labels)
            }
            None => self.contiguous_assignments(n_samples),
        };
        Ok(Folds {
            assignments,
            n_folds: self.n_folds,
            next: 0,
        })
    }

    /// Group rows by class (ascending), shuffle within each class, then deal
    /// round-robin. The dealing position carries over from one class to the
    /// next, so fold sizes also differ by at most one.
    fn stratified_assignments(&self, labels: &[usize]) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(i);
        }

        let mut assignments = vec![0usize; labels.len()];
        let mut position = 0usize;
        for (class, indices) in &mut by_class {
            if indices.len() < self.n_folds {
                debug!(
                    class,
                    members = indices.len(),
                    n_folds = self.n_folds,
                    "class smaller than fold count, some folds will lack it"
                );
            }
            if self.shuffle {
                indices.shuffle(&mut rng);
            }
            for &i in indices.iter() {
                assignments[i] = position % self.n_folds;
                position += 1;
            }
        }

        debug!(n_classes = by_class.len(), "stratified assignments built");
        assignments
    }

    /// Cut (optionally shuffled) rows into contiguous blocks; the first
    /// `n % k` blocks get one extra row.
    fn contiguous_assignments(&self, n_samples: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        let base = n_samples / self.n_folds;
        let extra = n_samples % self.n_folds;
        let mut assignments = vec![0usize; n_samples];
        let mut start = 0;
        for fold in 0..self.n_folds {
            let size = base + usize::from(fold < extra);
            for &i in &order[start..start + size] {
                assignments[i] = fold;
            }
            start += size;
        }
        assignments
    }
}

/// Lazy, single-pass iterator over the folds of one partition.
#[derive(Debug, Clone)]
pub struct Folds {
    assignments: Vec<usize>,
    n_folds: usize,
    next: usize,
}

impl Folds {
    /// Fold index of every row.
    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }
}

impl Iterator for Folds {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        if self.next >= self.n_folds {
            return None;
        }
        let fold_idx = self.next;
        self.next += 1;

        let (validation_indices, train_indices): (Vec<usize>, Vec<usize>) =
            (0..self.assignments.len()).partition(|&i| self.assignments[i] == fold_idx);
        Some(Fold {
            fold_idx,
            train_indices,
            validation_indices,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_folds - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Folds {}

/// Gather the rows at `indices`.
pub(crate) fn take_rows<T: Clone>(data: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| data[i].clone()).collect()
}
