use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::backend::{ClassifierBackend, ClustererBackend, DirectionModel, DirectionPrediction, SegmentModel};
use super::features::{CandleFeatures, LabeledSample};
use super::persistence::{ModelMetrics, ModelSlot, ModelStore, ModelVersion, StoredModel};
use crate::error::{LearnerError, Result};

/// The active model of one slot. Swapped whole, never mutated in place.
struct Active<M: ?Sized> {
    model: Arc<M>,
    version: ModelVersion,
    metrics: ModelMetrics,
}

/// Lifecycle of the direction classifier and the segment clusterer.
///
/// Training fits a new model off to the side, publishes it through the
/// [`ModelStore`] and only then swaps the in-memory handle, so concurrent
/// predictions observe either the old or the new model.
pub struct ModelRegistry {
    store: ModelStore,
    classifier_backend: Arc<dyn ClassifierBackend>,
    clusterer_backend: Arc<dyn ClustererBackend>,
    classifier: RwLock<Option<Active<dyn DirectionModel>>>,
    clusterer: RwLock<Option<Active<dyn SegmentModel>>>,
}

impl ModelRegistry {
    pub fn new(
        store: ModelStore,
        classifier_backend: Arc<dyn ClassifierBackend>,
        clusterer_backend: Arc<dyn ClustererBackend>,
    ) -> Self {
        Self {
            store,
            classifier_backend,
            clusterer_backend,
            classifier: RwLock::new(None),
            clusterer: RwLock::new(None),
        }
    }

    pub async fn classifier_exists(&self) -> bool {
        self.classifier.read().await.is_some()
    }

    pub async fn clusterer_exists(&self) -> bool {
        self.clusterer.read().await.is_some()
    }

    pub async fn version(&self, slot: ModelSlot) -> Option<ModelVersion> {
        match slot {
            ModelSlot::Classifier => self.classifier.read().await.as_ref().map(|a| a.version.clone()),
            ModelSlot::Clusterer => self.clusterer.read().await.as_ref().map(|a| a.version.clone()),
        }
    }

    pub async fn metrics(&self, slot: ModelSlot) -> Option<ModelMetrics> {
        match slot {
            ModelSlot::Classifier => self.classifier.read().await.as_ref().map(|a| a.metrics.clone()),
            ModelSlot::Clusterer => self.clusterer.read().await.as_ref().map(|a| a.metrics.clone()),
        }
    }

    /// Load both slots from disk. Missing or unreadable slots stay absent.
    pub async fn load_if_present(&self) {
        match self.load_stored(ModelSlot::Classifier) {
            Some(stored) => match self.classifier_backend.decode(stored.payload) {
                Ok(model) => {
                    *self.classifier.write().await = Some(Active {
                        model: Arc::from(model),
                        version: stored.version,
                        metrics: stored.metrics,
                    });
                }
                Err(e) => warn!("Ignoring unreadable classifier model: {}", e),
            },
            None => info!("No classifier model found"),
        }

        match self.load_stored(ModelSlot::Clusterer) {
            Some(stored) => match self.clusterer_backend.decode(stored.payload) {
                Ok(model) => {
                    *self.clusterer.write().await = Some(Active {
                        model: Arc::from(model),
                        version: stored.version,
                        metrics: stored.metrics,
                    });
                }
                Err(e) => warn!("Ignoring unreadable clusterer model: {}", e),
            },
            None => info!("No clusterer model found"),
        }
    }

    fn load_stored(&self, slot: ModelSlot) -> Option<StoredModel> {
        match self.store.load(slot) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to load {} model: {}", slot, e);
                None
            }
        }
    }

    /// Fit, persist and activate a new classifier
    pub async fn train_classifier(&self, samples: Vec<LabeledSample>) -> Result<ModelVersion> {
        info!("Training classifier on {} samples...", samples.len());
        let version = ModelVersion::next(self.version(ModelSlot::Classifier).await.as_ref());
        let backend = Arc::clone(&self.classifier_backend);
        let store = self.store.clone();
        let published = version.clone();
        let fitted = tokio::task::spawn_blocking(move || {
            let fitted = backend.fit(&samples)?;
            store.save(&StoredModel {
                slot: ModelSlot::Classifier,
                backend: backend.name().to_string(),
                version: published,
                trained_at: Utc::now(),
                metrics: fitted.metrics.clone(),
                payload: fitted.model.encode()?,
            })?;
            Ok::<_, LearnerError>(fitted)
        })
        .await
        .map_err(|e| LearnerError::training(ModelSlot::Classifier, e))??;

        *self.classifier.write().await = Some(Active {
            model: Arc::from(fitted.model),
            version: version.clone(),
            metrics: fitted.metrics,
        });
        info!("Classifier v{} active", version);
        Ok(version)
    }

    /// Fit, persist and activate a new clusterer with `k` groups
    pub async fn train_clusterer(&self, samples: Vec<CandleFeatures>, k: usize) -> Result<ModelVersion> {
        info!("Training clusterer (k={}) on {} samples...", k, samples.len());
        let version = ModelVersion::next(self.version(ModelSlot::Clusterer).await.as_ref());
        let backend = Arc::clone(&self.clusterer_backend);
        let store = self.store.clone();
        let published = version.clone();
        let fitted = tokio::task::spawn_blocking(move || {
            let fitted = backend.fit(&samples, k)?;
            store.save(&StoredModel {
                slot: ModelSlot::Clusterer,
                backend: backend.name().to_string(),
                version: published,
                trained_at: Utc::now(),
                metrics: fitted.metrics.clone(),
                payload: fitted.model.encode()?,
            })?;
            Ok::<_, LearnerError>(fitted)
        })
        .await
        .map_err(|e| LearnerError::training(ModelSlot::Clusterer, e))??;

        *self.clusterer.write().await = Some(Active {
            model: Arc::from(fitted.model),
            version: version.clone(),
            metrics: fitted.metrics,
        });
        info!("Clusterer v{} active", version);
        Ok(version)
    }

    pub async fn predict_direction(&self, features: &CandleFeatures) -> Result<DirectionPrediction> {
        let model = self
            .classifier
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.model))
            .ok_or(LearnerError::ModelNotLoaded(ModelSlot::Classifier))?;
        Ok(model.predict(features))
    }

    /// 0-based cluster id regardless of the backend's numbering
    pub async fn predict_cluster(&self, features: &CandleFeatures) -> Result<u32> {
        let model = self
            .clusterer
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.model))
            .ok_or(LearnerError::ModelNotLoaded(ModelSlot::Clusterer))?;
        Ok(model.assign(features).saturating_sub(model.first_id()))
    }
}
