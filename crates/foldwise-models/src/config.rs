//! Hyperparameters shared by the tree ensembles.

use foldwise_cv::{ModelError, ParamSet, ParamValue};

/// Strategy for the number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// `ceil(sqrt(n_features))`.
    Sqrt,
    /// Every feature.
    All,
    /// A fixed count, which must not exceed the feature count at fit time.
    Count(usize),
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_features` columns.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] when the count resolves
    /// outside `1..=n_features`.
    pub fn resolve(self, n_features: usize) -> Result<usize, ModelError> {
        let resolved = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(n) => n,
        };
        if resolved == 0 || resolved > n_features {
            return Err(ModelError::InvalidParamValue {
                name: "max_features".to_string(),
                value: resolved.to_string(),
                reason: format!("must be in 1..={n_features}"),
            });
        }
        Ok(resolved)
    }

    fn from_param(name: &str, value: &ParamValue) -> Result<Self, ModelError> {
        match value {
            ParamValue::Text(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
            ParamValue::Text(s) if s == "all" => Ok(MaxFeatures::All),
            ParamValue::Int(_) => match value.as_usize(name)? {
                0 => Err(value.invalid(name, "must be at least 1")),
                n => Ok(MaxFeatures::Count(n)),
            },
            _ => Err(value.invalid(name, "expected \"sqrt\", \"all\", or a positive count")),
        }
    }

    fn to_param(self) -> ParamValue {
        match self {
            MaxFeatures::Sqrt => ParamValue::from("sqrt"),
            MaxFeatures::All => ParamValue::from("all"),
            MaxFeatures::Count(n) => ParamValue::from(n),
        }
    }
}

/// Configuration for a bagged tree ensemble.
///
/// Construct via [`EnsembleConfig::new`], then chain `with_*` methods.
/// Every setter is also reachable by name through
/// [`Estimator::set_param`](foldwise_cv::Estimator::set_param), which is
/// how grid search applies candidates.
///
/// # Defaults
///
/// | Parameter           | Default |
/// |---------------------|---------|
/// | `max_depth`         | `None`  |
/// | `min_samples_split` | 2       |
/// | `min_samples_leaf`  | 1       |
/// | `max_features`      | `Sqrt`  |
/// | `seed`              | 42      |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnsembleConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) seed: u64,
}

impl EnsembleConfig {
    /// Create a config growing `n_trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ModelError> {
        if n_trees == 0 {
            return Err(ParamValue::from(n_trees).invalid("n_trees", "must be at least 1"));
        }
        Ok(Self {
            n_trees,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        })
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the max features strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Check the limits that do not depend on the data.
    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        if self.n_trees == 0 {
            return Err(ParamValue::from(self.n_trees).invalid("n_trees", "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(ParamValue::from(0usize).invalid("max_depth", "must be at least 1 or null"));
        }
        if self.min_samples_split < 2 {
            return Err(ParamValue::from(self.min_samples_split)
                .invalid("min_samples_split", "must be at least 2"));
        }
        if self.min_samples_leaf < 1 {
            return Err(ParamValue::from(self.min_samples_leaf)
                .invalid("min_samples_leaf", "must be at least 1"));
        }
        Ok(())
    }

    /// Apply one named hyperparameter, leaving `self` untouched on error.
    pub(crate) fn set(
        &mut self,
        estimator: &'static str,
        name: &str,
        value: &ParamValue,
    ) -> Result<(), ModelError> {
        let mut next = self.clone();
        match name {
            "n_trees" => next.n_trees = value.as_usize(name)?,
            "max_depth" => next.max_depth = value.as_opt_usize(name)?,
            "min_samples_split" => next.min_samples_split = value.as_usize(name)?,
            "min_samples_leaf" => next.min_samples_leaf = value.as_usize(name)?,
            "max_features" => next.max_features = MaxFeatures::from_param(name, value)?,
            "seed" => next.seed = value.as_u64(name)?,
            other => {
                return Err(ModelError::UnknownParam {
                    estimator,
                    name: other.to_string(),
                });
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub(crate) fn params(&self) -> ParamSet {
        [
            ("n_trees", ParamValue::from(self.n_trees)),
            ("max_depth", ParamValue::from(self.max_depth)),
            ("min_samples_split", ParamValue::from(self.min_samples_split)),
            ("min_samples_leaf", ParamValue::from(self.min_samples_leaf)),
            ("max_features", self.max_features.to_param()),
            ("seed", ParamValue::from(self.seed)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }
}
