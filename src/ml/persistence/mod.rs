use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{LearnerError, Result};

/// The two independent model slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSlot {
    Classifier,
    Clusterer,
}

impl ModelSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSlot::Classifier => "classifier",
            ModelSlot::Clusterer => "clusterer",
        }
    }

    pub fn all() -> [ModelSlot; 2] {
        [ModelSlot::Classifier, ModelSlot::Clusterer]
    }
}

impl std::fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic version for models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModelVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    pub fn initial() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Next version after `current`, or the initial one
    pub fn next(current: Option<&ModelVersion>) -> Self {
        current.map(|v| v.bump_patch()).unwrap_or_else(Self::initial)
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Training metrics stored alongside the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train_samples: usize,
    pub accuracy: Option<f64>,
    pub clusters: Option<usize>,
}

/// On-disk envelope for one slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModel {
    pub slot: ModelSlot,
    pub backend: String,
    pub version: ModelVersion,
    pub trained_at: DateTime<Utc>,
    pub metrics: ModelMetrics,
    pub payload: serde_json::Value,
}

/// Path-addressed model store: one published file per slot.
///
/// A save writes `<slot>.json.tmp`, syncs it and renames it over
/// `<slot>.json`, so readers only ever see a complete envelope.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self { models_dir: models_dir.into() }
    }

    /// Ensure models directory exists
    pub fn ensure_models_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.models_dir)
            .map_err(|e| LearnerError::persistence(self.models_dir.display(), e))
    }

    pub fn model_path(&self, slot: ModelSlot) -> PathBuf {
        self.models_dir.join(format!("{}.json", slot.as_str()))
    }

    fn staging_path(&self, slot: ModelSlot) -> PathBuf {
        self.models_dir.join(format!("{}.json.tmp", slot.as_str()))
    }

    /// Write the whole envelope, then publish it with a rename
    pub fn save(&self, model: &StoredModel) -> Result<PathBuf> {
        self.ensure_models_dir()?;

        let final_path = self.model_path(model.slot);
        let staging = self.staging_path(model.slot);
        let fail = |e: &dyn std::fmt::Display| LearnerError::persistence(final_path.display(), e);

        let json = serde_json::to_vec_pretty(model).map_err(|e| fail(&e))?;
        {
            let mut file = File::create(&staging).map_err(|e| fail(&e))?;
            file.write_all(&json).map_err(|e| fail(&e))?;
            file.sync_all().map_err(|e| fail(&e))?;
        }
        fs::rename(&staging, &final_path).map_err(|e| fail(&e))?;

        info!(
            "Saved {} model v{} ({}) to {}",
            model.slot,
            model.version,
            model.backend,
            final_path.display()
        );
        Ok(final_path)
    }

    /// Load the published envelope; `Ok(None)` when the slot was never saved
    pub fn load(&self, slot: ModelSlot) -> Result<Option<StoredModel>> {
        let path = self.model_path(slot);
        if !path.is_file() {
            debug!("No {} model at {}", slot, path.display());
            return Ok(None);
        }

        let data = fs::read(&path).map_err(|e| LearnerError::persistence(path.display(), e))?;
        let stored: StoredModel = serde_json::from_slice(&data)
            .map_err(|e| LearnerError::persistence(path.display(), e))?;

        if stored.slot != slot {
            warn!("{} holds a {} model", path.display(), stored.slot);
            return Err(LearnerError::persistence(
                path.display(),
                format!("slot mismatch: expected {}, found {}", slot, stored.slot),
            ));
        }

        info!("Loaded {} model v{} from {}", slot, stored.version, path.display());
        Ok(Some(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(slot: ModelSlot, version: ModelVersion) -> StoredModel {
        StoredModel {
            slot,
            backend: "test".to_string(),
            version,
            trained_at: Utc::now(),
            metrics: ModelMetrics { train_samples: 3, accuracy: Some(0.5), clusters: None },
            payload: serde_json::json!({ "weights": [1.0, 2.0] }),
        }
    }

    #[test]
    fn test_model_version_display() {
        assert_eq!(ModelVersion::new(1, 2, 3).to_string(), "1.2.3");
    }

    #[test]
    fn test_next_version() {
        assert_eq!(ModelVersion::next(None), ModelVersion::initial());
        assert_eq!(ModelVersion::next(Some(&ModelVersion::new(1, 0, 4))), ModelVersion::new(1, 0, 5));
    }

    #[test]
    fn test_save_publishes_fixed_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        assert!(store.load(ModelSlot::Classifier).unwrap().is_none());

        let path = store.save(&stored(ModelSlot::Classifier, ModelVersion::initial())).unwrap();

        assert_eq!(path, dir.path().join("models").join("classifier.json"));
        assert!(store.model_path(ModelSlot::Classifier).is_file());
        assert!(!store.model_path(ModelSlot::Clusterer).is_file());
        assert!(!dir.path().join("models").join("classifier.json.tmp").exists());

        let loaded = store.load(ModelSlot::Classifier).unwrap().unwrap();
        assert_eq!(loaded.version, ModelVersion::initial());
        assert_eq!(loaded.payload["weights"][1], 2.0);
    }

    #[test]
    fn test_staging_file_is_not_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        std::fs::write(dir.path().join("clusterer.json.tmp"), b"{\"half\":").unwrap();

        assert!(store.load(ModelSlot::Clusterer).unwrap().is_none());
    }

    #[test]
    fn test_overwrite_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save(&stored(ModelSlot::Clusterer, ModelVersion::initial())).unwrap();
        store.save(&stored(ModelSlot::Clusterer, ModelVersion::new(1, 0, 1))).unwrap();

        let loaded = store.load(ModelSlot::Clusterer).unwrap().unwrap();
        assert_eq!(loaded.version, ModelVersion::new(1, 0, 1));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        std::fs::write(store.model_path(ModelSlot::Classifier), b"not json").unwrap();

        let err = store.load(ModelSlot::Classifier).unwrap_err();
        assert!(matches!(err, LearnerError::PersistenceFailure { .. }));
    }
}
