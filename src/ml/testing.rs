//! Deterministic backends for exercising the learning loop without real fitting.

use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::backend::{
    ClassifierBackend, ClustererBackend, DirectionModel, DirectionPrediction, Fitted, SegmentModel,
};
use super::features::{CandleFeatures, LabeledSample};
use super::persistence::{ModelMetrics, ModelSlot};
use crate::error::{LearnerError, Result};

struct AlwaysGreen;

impl DirectionModel for AlwaysGreen {
    fn predict(&self, _features: &CandleFeatures) -> DirectionPrediction {
        DirectionPrediction { label: true, probability: 1.0 }
    }

    fn encode(&self) -> Result<serde_json::Value> {
        Ok(json!({ "always": "green" }))
    }
}

/// Predicts green for everything and counts `fit` calls.
/// Fails every fit once `fail` is set.
#[derive(Default, Clone)]
pub struct AlwaysGreenBackend {
    pub fits: Arc<AtomicUsize>,
    pub last_fit_len: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl AlwaysGreenBackend {
    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ClassifierBackend for AlwaysGreenBackend {
    fn name(&self) -> &str {
        "always_green"
    }

    fn fit(&self, samples: &[LabeledSample]) -> Result<Fitted<dyn DirectionModel>> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        self.last_fit_len.store(samples.len(), Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LearnerError::training(ModelSlot::Classifier, "stub failure"));
        }
        Ok(Fitted {
            model: Box::new(AlwaysGreen),
            metrics: ModelMetrics { train_samples: samples.len(), ..Default::default() },
        })
    }

    fn decode(&self, _payload: serde_json::Value) -> Result<Box<dyn DirectionModel>> {
        Ok(Box::new(AlwaysGreen))
    }
}

/// Delegates everything to `inner` except `fit`, which always fails
pub struct FailingClassifierBackend<B> {
    inner: B,
}

impl<B: ClassifierBackend> FailingClassifierBackend<B> {
    pub fn wrapping(inner: B) -> Self {
        Self { inner }
    }
}

impl<B: ClassifierBackend> ClassifierBackend for FailingClassifierBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fit(&self, _samples: &[LabeledSample]) -> Result<Fitted<dyn DirectionModel>> {
        Err(LearnerError::training(ModelSlot::Classifier, "stub failure"))
    }

    fn decode(&self, payload: serde_json::Value) -> Result<Box<dyn DirectionModel>> {
        self.inner.decode(payload)
    }
}

/// Numbers clusters from 1: the raw id is the truncated close price
struct OneBased;

impl SegmentModel for OneBased {
    fn assign(&self, features: &CandleFeatures) -> u32 {
        features.close.max(1.0) as u32
    }

    fn first_id(&self) -> u32 {
        1
    }

    fn encode(&self) -> Result<serde_json::Value> {
        Ok(json!({ "first_id": 1 }))
    }
}

/// Counts `fit` calls and fails them while `fail` is set
#[derive(Default, Clone)]
pub struct OneBasedClustererBackend {
    pub fits: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
}

impl OneBasedClustererBackend {
    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ClustererBackend for OneBasedClustererBackend {
    fn name(&self) -> &str {
        "one_based"
    }

    fn fit(&self, samples: &[CandleFeatures], k: usize) -> Result<Fitted<dyn SegmentModel>> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LearnerError::training(ModelSlot::Clusterer, "stub failure"));
        }
        Ok(Fitted {
            model: Box::new(OneBased),
            metrics: ModelMetrics { train_samples: samples.len(), accuracy: None, clusters: Some(k) },
        })
    }

    fn decode(&self, _payload: serde_json::Value) -> Result<Box<dyn SegmentModel>> {
        Ok(Box::new(OneBased))
    }
}
