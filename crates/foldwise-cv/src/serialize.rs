//! Model persistence via bincode.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::error::CvError;
use crate::estimator::Estimator;
use crate::metadata::ModelMetadata;
use crate::model::SupervisedModel;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for a saved model.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope<E> {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Model name.
    name: String,
    /// Feature column names.
    features: Vec<String>,
    /// Normalized importance per feature name.
    feature_importance: BTreeMap<String, f64>,
    /// Full metadata record.
    metadata: ModelMetadata,
    /// The estimator, fitted or not.
    estimator: Option<E>,
}

impl<E> SupervisedModel<E>
where
    E: Estimator + Serialize + DeserializeOwned,
{
    /// Save the model to a binary file.
    ///
    /// Saving an untrained model logs a warning and proceeds.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::SerializeModel`] | bincode encoding failed |
    /// | [`CvError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(model = %self.name, path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CvError> {
        let path = path.as_ref();
        if !self.trained {
            warn!("saving an untrained model");
        }

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            name: self.name.clone(),
            features: self.features.clone(),
            feature_importance: self.feature_importance.clone(),
            metadata: self.metadata.clone(),
            estimator: self.estimator.clone(),
        };

        let bytes =
            bincode::serialize(&envelope).map_err(|e| CvError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| CvError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), trained = self.trained, "model saved");
        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// The trained flag is restored from the saved metadata.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CvError::ReadModel`] | file read failed |
    /// | [`CvError::DeserializeModel`] | bincode decoding failed |
    /// | [`CvError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CvError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| CvError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope<E> =
            bincode::deserialize(&bytes).map_err(|e| CvError::DeserializeModel {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(CvError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
                path: path.to_path_buf(),
            });
        }

        debug!(
            model = %envelope.name,
            n_features = envelope.features.len(),
            trained = envelope.metadata.trained,
            "model loaded"
        );

        Ok(Self {
            name: envelope.name,
            trained: envelope.metadata.trained && envelope.estimator.is_some(),
            estimator: envelope.estimator,
            features: envelope.features,
            feature_importance: envelope.feature_importance,
            metadata: envelope.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::Model;
    use crate::model::tests::{MajorityClassifier, two_class_data};

    #[test]
    fn round_trip_identical_predictions() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("test_model.bin");

        let (x, y) = two_class_data(12);
        let mut model = SupervisedModel::new("saved", MajorityClassifier::default())
            .with_feature_names(vec!["a".into(), "b".into()]);
        model.cross_validate_classification(&x, &y, 3, true).unwrap();
        model.train(&x, &y, 0.0).unwrap();
        model.save(&model_path).unwrap();

        let loaded: SupervisedModel<MajorityClassifier> =
            SupervisedModel::load(&model_path).unwrap();
        assert!(loaded.is_trained());
        assert_eq!(loaded.name(), "saved");
        assert_eq!(loaded.feature_names(), model.feature_names());
        assert_eq!(loaded.feature_importance(), model.feature_importance());
        assert_eq!(loaded.metadata(), model.metadata());
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn untrained_model_saves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("untrained.bin");
        let model = SupervisedModel::new("fresh", MajorityClassifier::default());
        model.save(&path).unwrap();
        let loaded: SupervisedModel<MajorityClassifier> = SupervisedModel::load(&path).unwrap();
        assert!(!loaded.is_trained());
    }

    #[test]
    fn load_nonexistent_file_error() {
        let dir = TempDir::new().unwrap();
        let err = SupervisedModel::<MajorityClassifier>::load(dir.path().join("missing.bin"))
            .unwrap_err();
        assert!(matches!(err, CvError::ReadModel { .. }));
    }

    #[test]
    fn load_corrupt_file_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.bin");
        std::fs::write(&path, b"not a valid bincode file").unwrap();
        let err = SupervisedModel::<MajorityClassifier>::load(&path).unwrap_err();
        assert!(matches!(err, CvError::DeserializeModel { .. }));
    }

    #[test]
    fn version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.bin");
        let model = SupervisedModel::new("future", MajorityClassifier::default());
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION + 1,
            name: model.name.clone(),
            features: Vec::new(),
            feature_importance: BTreeMap::new(),
            metadata: model.metadata.clone(),
            estimator: model.estimator.clone(),
        };
        std::fs::write(&path, bincode::serialize(&envelope).unwrap()).unwrap();
        let err = SupervisedModel::<MajorityClassifier>::load(&path).unwrap_err();
        assert!(matches!(
            err,
            CvError::IncompatibleModelVersion { expected: 1, found: 2, .. }
        ));
    }
}
