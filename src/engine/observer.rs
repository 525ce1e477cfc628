use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// One scored candle: what the classifier said about it from its predecessor,
/// and what the candle actually did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub symbol: String,
    /// Close time of the scored candle
    pub timestamp: DateTime<Utc>,
    pub predicted_label: bool,
    pub probability: f64,
    pub actual_label: bool,
}

impl Observation {
    pub fn is_hit(&self) -> bool {
        self.predicted_label == self.actual_label
    }
}

/// Outward stream of observations. Failures here never block the loop.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn record(&self, observation: &Observation) -> Result<()>;
}

/// Writes each observation as a structured log line
pub struct TracingSink;

#[async_trait]
impl ObservationSink for TracingSink {
    async fn record(&self, o: &Observation) -> Result<()> {
        info!(
            symbol = %o.symbol,
            time = %o.timestamp,
            predicted = o.predicted_label,
            probability = o.probability,
            actual = o.actual_label,
            "observation"
        );
        Ok(())
    }
}

/// Fans one observation out to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ObservationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ObservationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ObservationSink for FanoutSink {
    async fn record(&self, observation: &Observation) -> Result<()> {
        for sink in &self.sinks {
            sink.record(observation).await?;
        }
        Ok(())
    }
}
