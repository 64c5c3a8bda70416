//! Mapping between caller class labels and dense output columns.

/// Sorted distinct class labels seen at fit time.
///
/// Output column `j` of a fitted classifier scores `labels[j]`, so the
/// output width is the number of distinct training labels, whatever
/// their values.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct ClassIndex {
    labels: Vec<usize>,
}

impl ClassIndex {
    /// Index the distinct labels of `targets` and return the targets
    /// rewritten as column positions.
    pub(crate) fn fit(targets: &[usize]) -> (Self, Vec<usize>) {
        let mut labels = targets.to_vec();
        labels.sort_unstable();
        labels.dedup();
        // Every target is in `labels`, so the search always hits.
        let encoded = targets
            .iter()
            .map(|t| labels.binary_search(t).unwrap_or_default())
            .collect();
        (Self { labels }, encoded)
    }

    /// Label scored by output column `column`, which must be below
    /// [`ClassIndex::len`].
    pub(crate) fn label(&self, column: usize) -> usize {
        self.labels[column]
    }

    pub(crate) fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub(crate) fn len(&self) -> usize {
        self.labels.len()
    }
}
