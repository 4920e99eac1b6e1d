//! Ownership of the classifier: loading, retraining, persisting, predicting.
//!
//! The manager is either `Untrained` or `Trained`. It only becomes trained by
//! fitting on the full training buffer or by loading a usable artifact at
//! startup, and it never drops back to untrained. Every failure along the way
//! (store, decode, fit, predict) degrades to the previous state or to the
//! label fallback rather than propagating.

use crate::core::buffer::TrainingBuffer;
use crate::core::forest::{FitError, Forest, ForestSettings, PredictError};
use crate::store::{ModelStore, PredictionSource, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current artifact layout version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Default key under which the model artifact is stored.
pub const DEFAULT_MODEL_KEY: &str = "heart_model";

/// A fitted forest plus what it was fitted on.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub forest: Forest,
    /// Buffer length at the time of the fit
    pub training_set_size: usize,
    pub trained_at: DateTime<Utc>,
}

/// Classifier state as owned by the manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ClassifierState {
    #[default]
    Untrained,
    Trained(TrainedModel),
}

/// Serialized form of a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub training_set_size: usize,
    pub forest: Forest,
}

impl PersistedModel {
    pub fn from_model(model: &TrainedModel) -> Self {
        Self {
            format_version: ARTIFACT_VERSION,
            trained_at: model.trained_at,
            training_set_size: model.training_set_size,
            forest: model.forest.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode and validate an artifact.
    pub fn from_bytes(bytes: &[u8]) -> Result<TrainedModel, ModelLoadError> {
        let persisted: PersistedModel =
            serde_json::from_slice(bytes).map_err(|e| ModelLoadError::Decode(e.to_string()))?;

        if persisted.format_version != ARTIFACT_VERSION {
            return Err(ModelLoadError::UnsupportedVersion(persisted.format_version));
        }
        if !persisted.forest.is_fitted() {
            return Err(ModelLoadError::NotFitted);
        }

        Ok(TrainedModel {
            forest: persisted.forest,
            training_set_size: persisted.training_set_size,
            trained_at: persisted.trained_at,
        })
    }
}

/// Reasons a persisted model could not be used.
#[derive(Debug)]
pub enum ModelLoadError {
    Store(StoreError),
    Decode(String),
    UnsupportedVersion(u32),
    NotFitted,
}

impl std::fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelLoadError::Store(e) => write!(f, "Could not fetch model: {e}"),
            ModelLoadError::Decode(msg) => write!(f, "Could not decode model: {msg}"),
            ModelLoadError::UnsupportedVersion(v) => {
                write!(f, "Unsupported model format version {v}")
            }
            ModelLoadError::NotFitted => write!(f, "Stored model has no fitted parameters"),
        }
    }
}

impl std::error::Error for ModelLoadError {}

/// Result of the startup load.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { training_set_size: usize },
    Missing,
    Rejected(ModelLoadError),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// What happened after a sample was appended.
#[derive(Debug)]
pub enum RetrainOutcome {
    /// Buffer length is not a multiple of the interval
    NotDue,
    Retrained {
        training_set_size: usize,
        /// Upload error, if persisting the new model failed
        persist_error: Option<StoreError>,
    },
    /// Fit failed; the previous state is kept
    FitFailed(FitError),
}

impl RetrainOutcome {
    pub fn retrained(&self) -> bool {
        matches!(self, RetrainOutcome::Retrained { .. })
    }
}

/// A prediction and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub abnormal: bool,
    pub source: PredictionSource,
}

/// Settings controlling the manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Retrain whenever the buffer length is a multiple of this
    pub retrain_interval: usize,
    pub model_key: String,
    pub forest: ForestSettings,
    /// Base seed for bootstrap sampling
    pub seed: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            retrain_interval: 10,
            model_key: DEFAULT_MODEL_KEY.to_string(),
            forest: ForestSettings::default(),
            seed: 42,
        }
    }
}

/// Owns the classifier state.
#[derive(Debug)]
pub struct ClassifierManager {
    settings: ManagerSettings,
    state: ClassifierState,
}

impl ClassifierManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self {
            settings,
            state: ClassifierState::Untrained,
        }
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ClassifierState::Trained(_))
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Try to adopt the persisted model at startup.
    ///
    /// Never fails: any problem leaves the manager in its current state.
    pub fn load_from_store(&mut self, store: &dyn ModelStore) -> LoadOutcome {
        let key = self.settings.model_key.as_str();

        match store.exists(key) {
            Ok(false) => {
                tracing::info!(key, "No persisted model, starting untrained");
                return LoadOutcome::Missing;
            }
            Err(e) => {
                tracing::warn!(key, "Model store unavailable: {e}");
                return LoadOutcome::Rejected(ModelLoadError::Store(e));
            }
            Ok(true) => {}
        }

        let model = store
            .download(key)
            .map_err(ModelLoadError::Store)
            .and_then(|bytes| PersistedModel::from_bytes(&bytes));

        match model {
            Ok(model) => {
                let training_set_size = model.training_set_size;
                tracing::info!(
                    key,
                    training_set_size,
                    trained_at = %model.trained_at,
                    "Loaded persisted model"
                );
                self.state = ClassifierState::Trained(model);
                LoadOutcome::Loaded { training_set_size }
            }
            Err(e) => {
                tracing::warn!(key, "Ignoring persisted model: {e}");
                LoadOutcome::Rejected(e)
            }
        }
    }

    /// Retrain on the whole buffer if its length hits the interval, then
    /// persist the new model.
    pub fn after_append(
        &mut self,
        buffer: &TrainingBuffer,
        store: &dyn ModelStore,
    ) -> RetrainOutcome {
        if !self.retrain_due(buffer.len()) {
            return RetrainOutcome::NotDue;
        }

        if let Err(e) = self.retrain(buffer) {
            tracing::warn!(buffer_len = buffer.len(), "Retrain failed, keeping previous model: {e}");
            return RetrainOutcome::FitFailed(e);
        }

        let persist_error = self.persist(store).err();
        if let Some(ref e) = persist_error {
            tracing::warn!(key = %self.settings.model_key, "Failed to upload model: {e}");
        }

        RetrainOutcome::Retrained {
            training_set_size: buffer.len(),
            persist_error,
        }
    }

    /// Whether a buffer of `len` samples triggers a retrain.
    pub fn retrain_due(&self, len: usize) -> bool {
        len > 0 && self.settings.retrain_interval > 0 && len % self.settings.retrain_interval == 0
    }

    /// Fit a fresh forest on the whole buffer and swap it in.
    ///
    /// The state is only replaced once the fit has succeeded.
    pub fn retrain(&mut self, buffer: &TrainingBuffer) -> Result<(), FitError> {
        let (features, labels) = buffer.training_set();
        let seed = self.settings.seed ^ buffer.len() as u64;
        let forest = Forest::fit(&features, &labels, &self.settings.forest, seed)?;

        tracing::info!(
            buffer_len = buffer.len(),
            trees = forest.n_trees(),
            summary = %buffer.summary(),
            "Retrained model"
        );

        self.state = ClassifierState::Trained(TrainedModel {
            forest,
            training_set_size: buffer.len(),
            trained_at: Utc::now(),
        });
        Ok(())
    }

    /// Upload the current model, replacing the stored artifact.
    pub fn persist(&self, store: &dyn ModelStore) -> Result<(), StoreError> {
        let ClassifierState::Trained(ref model) = self.state else {
            return Ok(());
        };
        let bytes = PersistedModel::from_model(model).to_bytes()?;
        store.upload(&self.settings.model_key, &bytes)?;
        tracing::debug!(
            key = %self.settings.model_key,
            bytes = bytes.len(),
            "Uploaded model"
        );
        Ok(())
    }

    /// Ask the model alone.
    pub fn predict(&self, value: i32) -> Result<bool, PredictError> {
        match self.state {
            ClassifierState::Untrained => Err(PredictError::NoTrees),
            ClassifierState::Trained(ref model) => model.forest.predict(&[f64::from(value)]),
        }
    }

    /// Ask the model, answering with `fallback_label` when it cannot.
    pub fn predict_or_fallback(&self, value: i32, fallback_label: bool) -> Prediction {
        let fallback = Prediction {
            abnormal: fallback_label,
            source: PredictionSource::Fallback,
        };

        let ClassifierState::Trained(ref model) = self.state else {
            tracing::debug!(value, "Model is not fitted yet, using label");
            return fallback;
        };

        match model.forest.predict(&[f64::from(value)]) {
            Ok(abnormal) => Prediction {
                abnormal,
                source: PredictionSource::Model,
            },
            Err(e) => {
                tracing::warn!(value, "Prediction failed, using label: {e}");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::Reading;
    use crate::store::MemoryModelStore;

    fn small_settings(interval: usize) -> ManagerSettings {
        ManagerSettings {
            retrain_interval: interval,
            forest: ForestSettings {
                n_trees: 15,
                ..ForestSettings::default()
            },
            ..ManagerSettings::default()
        }
    }

    fn push(buffer: &mut TrainingBuffer, value: i32) {
        buffer.append(
            Reading {
                timestamp: Utc::now(),
                value,
            },
            value > 100,
        );
    }

    /// Store whose every call fails.
    struct BrokenStore;

    impl ModelStore for BrokenStore {
        fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Network("connection refused".to_string()))
        }

        fn download(&self, _key: &str) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::Network("connection refused".to_string()))
        }

        fn upload(&self, _key: &str, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Network("connection refused".to_string()))
        }
    }

    #[test]
    fn test_retrains_at_multiples_of_interval() {
        let mut manager = ClassifierManager::new(small_settings(10));
        let store = MemoryModelStore::new();
        let mut buffer = TrainingBuffer::new();
        let mut retrained_at = Vec::new();

        for i in 0..35 {
            push(&mut buffer, 60 + (i * 7) % 90);
            if manager.after_append(&buffer, &store).retrained() {
                retrained_at.push(buffer.len());
            }
        }

        assert_eq!(retrained_at, vec![10, 20, 30]);
        assert_eq!(store.upload_count(), 3);
    }

    #[test]
    fn test_untrained_falls_back_to_label() {
        let manager = ClassifierManager::new(small_settings(10));
        assert!(!manager.is_trained());

        for (value, label) in [(72, false), (130, true), (95, false)] {
            let prediction = manager.predict_or_fallback(value, label);
            assert_eq!(prediction.abnormal, label);
            assert_eq!(prediction.source, PredictionSource::Fallback);
        }
        assert!(manager.predict(72).is_err());
    }

    #[test]
    fn test_trained_prediction_uses_model() {
        let mut manager = ClassifierManager::new(small_settings(4));
        let store = MemoryModelStore::new();
        let mut buffer = TrainingBuffer::new();
        for value in [60, 70, 130, 140] {
            push(&mut buffer, value);
            manager.after_append(&buffer, &store);
        }

        assert!(manager.is_trained());
        let prediction = manager.predict_or_fallback(135, false);
        assert_eq!(prediction.source, PredictionSource::Model);
        assert!(prediction.abnormal);
    }

    #[test]
    fn test_load_valid_artifact() {
        let store = MemoryModelStore::new();
        let mut trainer = ClassifierManager::new(small_settings(4));
        let mut buffer = TrainingBuffer::new();
        for value in [60, 70, 130, 140] {
            push(&mut buffer, value);
            trainer.after_append(&buffer, &store);
        }

        let mut manager = ClassifierManager::new(small_settings(4));
        let outcome = manager.load_from_store(&store);

        assert!(matches!(
            outcome,
            LoadOutcome::Loaded {
                training_set_size: 4
            }
        ));
        for value in [50, 65, 100, 135, 180] {
            assert_eq!(manager.predict(value), trainer.predict(value));
        }
        assert_eq!(
            manager.predict_or_fallback(65, true).source,
            PredictionSource::Model
        );
    }

    #[test]
    fn test_missing_or_corrupt_artifact_stays_untrained() {
        let mut manager = ClassifierManager::new(small_settings(10));

        let store = MemoryModelStore::new();
        assert!(matches!(manager.load_from_store(&store), LoadOutcome::Missing));

        store.insert(DEFAULT_MODEL_KEY, b"\x00not a model".to_vec());
        assert!(matches!(
            manager.load_from_store(&store),
            LoadOutcome::Rejected(ModelLoadError::Decode(_))
        ));

        let unfitted = serde_json::json!({
            "format_version": ARTIFACT_VERSION,
            "trained_at": Utc::now(),
            "training_set_size": 0,
            "forest": { "n_features": 1, "trees": [] }
        });
        store.insert(DEFAULT_MODEL_KEY, serde_json::to_vec(&unfitted).unwrap());
        assert!(matches!(
            manager.load_from_store(&store),
            LoadOutcome::Rejected(ModelLoadError::NotFitted)
        ));

        assert!(matches!(
            manager.load_from_store(&BrokenStore),
            LoadOutcome::Rejected(ModelLoadError::Store(_))
        ));
        assert!(!manager.is_trained());
    }

    #[test]
    fn test_future_format_version_is_rejected() {
        let store = MemoryModelStore::new();
        let artifact = serde_json::json!({
            "format_version": ARTIFACT_VERSION + 1,
            "trained_at": Utc::now(),
            "training_set_size": 10,
            "forest": { "n_features": 1, "trees": [] }
        });
        store.insert(DEFAULT_MODEL_KEY, serde_json::to_vec(&artifact).unwrap());

        let mut manager = ClassifierManager::new(small_settings(10));
        assert!(matches!(
            manager.load_from_store(&store),
            LoadOutcome::Rejected(ModelLoadError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_upload_failure_keeps_new_model() {
        let mut manager = ClassifierManager::new(small_settings(2));
        let mut buffer = TrainingBuffer::new();
        push(&mut buffer, 60);
        manager.after_append(&buffer, &BrokenStore);
        push(&mut buffer, 140);

        let outcome = manager.after_append(&buffer, &BrokenStore);
        assert!(matches!(
            outcome,
            RetrainOutcome::Retrained {
                training_set_size: 2,
                persist_error: Some(_)
            }
        ));
        assert!(manager.is_trained());
    }

    #[test]
    fn test_fit_failure_keeps_previous_state() {
        let mut manager = ClassifierManager::new(ManagerSettings {
            retrain_interval: 1,
            forest: ForestSettings {
                n_trees: 0,
                ..ForestSettings::default()
            },
            ..ManagerSettings::default()
        });
        let mut buffer = TrainingBuffer::new();
        push(&mut buffer, 80);

        let outcome = manager.after_append(&buffer, &MemoryModelStore::new());
        assert!(matches!(outcome, RetrainOutcome::FitFailed(FitError::NoTrees)));
        assert!(!manager.is_trained());
    }

    #[test]
    fn test_predict_failure_falls_back_without_state_change() {
        let forest_json = serde_json::json!({
            "n_features": 1,
            "trees": [{ "nodes": [
                { "kind": "split", "feature": 0, "threshold": 100.0, "left": 7, "right": 8 }
            ]}]
        });
        let artifact = serde_json::json!({
            "format_version": ARTIFACT_VERSION,
            "trained_at": Utc::now(),
            "training_set_size": 10,
            "forest": forest_json
        });
        let store = MemoryModelStore::new();
        store.insert(DEFAULT_MODEL_KEY, serde_json::to_vec(&artifact).unwrap());

        let mut manager = ClassifierManager::new(small_settings(10));
        assert!(manager.load_from_store(&store).is_loaded());

        let before = manager.state().clone();
        let prediction = manager.predict_or_fallback(120, true);
        assert_eq!(prediction.source, PredictionSource::Fallback);
        assert!(prediction.abnormal);
        assert_eq!(manager.state(), &before);
    }
}
