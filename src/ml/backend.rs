use serde::{Deserialize, Serialize};

use super::features::{CandleFeatures, LabeledSample};
use super::persistence::ModelMetrics;
use crate::error::Result;

/// Direction predicted for the next candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionPrediction {
    /// `true` = next candle expected to close green
    pub label: bool,
    /// Probability of a green close
    pub probability: f64,
}

/// A trained binary classifier over candle features
pub trait DirectionModel: Send + Sync {
    /// Must be deterministic for a fixed model and input
    fn predict(&self, features: &CandleFeatures) -> DirectionPrediction;

    fn encode(&self) -> Result<serde_json::Value>;
}

/// A trained partition of the candle population
pub trait SegmentModel: Send + Sync {
    /// Backend-native cluster id
    fn assign(&self, features: &CandleFeatures) -> u32;

    /// Smallest id `assign` can return (0 or 1 depending on the backend)
    fn first_id(&self) -> u32 {
        0
    }

    fn encode(&self) -> Result<serde_json::Value>;
}

/// A freshly fitted model with its training metrics
pub struct Fitted<M: ?Sized> {
    pub model: Box<M>,
    pub metrics: ModelMetrics,
}

pub trait ClassifierBackend: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, samples: &[LabeledSample]) -> Result<Fitted<dyn DirectionModel>>;

    fn decode(&self, payload: serde_json::Value) -> Result<Box<dyn DirectionModel>>;
}

pub trait ClustererBackend: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, samples: &[CandleFeatures], k: usize) -> Result<Fitted<dyn SegmentModel>>;

    fn decode(&self, payload: serde_json::Value) -> Result<Box<dyn SegmentModel>>;
}
