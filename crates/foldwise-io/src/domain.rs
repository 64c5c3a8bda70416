//! Domain types for foldwise-io.

use std::collections::BTreeMap;

use foldwise_cv::Task;

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered class names; a label's index is its position here.
///
/// Names that all parse as integers are sorted numerically, otherwise
/// lexicographically, so `"2"` precedes `"10"`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ClassEncoding {
    classes: Vec<String>,
}

impl ClassEncoding {
    /// Build the encoding from raw labels.
    pub fn fit<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = raw
            .into_iter()
            .map(str::to_string)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let numeric: Option<Vec<i64>> = classes.iter().map(|c| c.parse().ok()).collect();
        if let Some(keys) = numeric {
            let mut pairs: Vec<(i64, String)> = keys.into_iter().zip(classes).collect();
            pairs.sort_by_key(|(k, _)| *k);
            classes = pairs.into_iter().map(|(_, c)| c).collect();
        }
        Self { classes }
    }

    /// Wrap class names already in label order.
    #[must_use]
    pub fn from_classes(classes: Vec<String>) -> Self {
        Self { classes }
    }

    /// Label index of `name`, if known.
    #[must_use]
    pub fn encode(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }

    /// Class name of label `index`; unknown labels render as the index.
    #[must_use]
    pub fn decode(&self, index: usize) -> String {
        self.classes
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    /// Return the class names in label order.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Return the number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Return `true` if there are no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// The target column, typed by task.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Class labels encoded as dense indices.
    Classes {
        /// One label index per row.
        labels: Vec<usize>,
        /// Mapping between indices and the original label strings.
        encoding: ClassEncoding,
    },
    /// Continuous values.
    Values(Vec<f64>),
}

impl Targets {
    /// Return the task these targets imply.
    #[must_use]
    pub fn task(&self) -> Task {
        match self {
            Targets::Classes { .. } => Task::Classification,
            Targets::Values(_) => Task::Regression,
        }
    }

    /// Return the number of target values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes { labels, .. } => labels.len(),
            Targets::Values(values) => values.len(),
        }
    }

    /// Return `true` if there are no target values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A feature matrix with one named target column.
///
/// Produced by [`CsvReader::read`](crate::CsvReader::read). Rows keep file
/// order; `features[i]` pairs with the `i`-th target.
#[derive(Debug, Clone)]
pub struct TabularDataset {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    target_name: String,
    targets: Targets,
}

impl TabularDataset {
    pub(crate) fn new(
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        target_name: String,
        targets: Targets,
    ) -> Self {
        Self {
            feature_names,
            features,
            target_name,
            targets,
        }
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the target column name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Return the targets.
    #[must_use]
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Rows per class label, for classification datasets.
    #[must_use]
    pub fn class_counts(&self) -> Option<BTreeMap<String, usize>> {
        let Targets::Classes { labels, encoding } = &self.targets else {
            return None;
        };
        let mut counts = BTreeMap::new();
        for &label in labels {
            *counts.entry(encoding.decode(label)).or_insert(0) += 1;
        }
        Some(counts)
    }
}

/// Unlabeled rows to predict on, with their column names.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Feature column names, in the order of each row.
    pub feature_names: Vec<String>,
    /// Feature values: `features[sample_index][feature_index]`.
    pub features: Vec<Vec<f64>>,
}
