use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::controller::{LoopController, LoopPhase};
use super::observer::{Observation, ObservationSink};
use super::policy::RetrainPolicy;
use crate::config::LearningSettings;
use crate::error::{LearnerError, Result};
use crate::ml::{
    build_labeled_samples, build_unlabeled, AccuracyTracker, CandleFeatures, LabeledSample, ModelRegistry,
    ModelVersion,
};
use crate::store::{CandleStore, ResumeStateStore};
use crate::types::Candle;

/// What a bootstrap pass actually trained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapReport {
    pub classifier_trained: bool,
    pub clusterer_trained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing newer than the cursor
    Idle,
    /// Number of candles the cursor moved over
    Processed(usize),
}

/// Slice used to fit the clusterer: everything after the supervised window,
/// or the whole history when that remainder cannot form `k` groups.
fn clustering_slice(candles: &[Candle], initial_window: usize, k: usize) -> &[Candle] {
    let remainder = &candles[initial_window.min(candles.len())..];
    if remainder.len() < k.max(1) {
        candles
    } else {
        remainder
    }
}

/// Sequential predict / correct / retrain worker for one symbol
pub struct OnlineLearner {
    symbol: String,
    settings: LearningSettings,
    policy: RetrainPolicy,
    candles: Arc<dyn CandleStore>,
    cursor: Arc<dyn ResumeStateStore>,
    registry: Arc<ModelRegistry>,
    sink: Arc<dyn ObservationSink>,
    controller: Arc<LoopController>,
    /// Mispredicted samples since the last successful classifier retrain
    buffer: Vec<LabeledSample>,
    since_cluster_retrain: usize,
    tracker: AccuracyTracker,
}

impl OnlineLearner {
    pub fn new(
        symbol: impl Into<String>,
        settings: LearningSettings,
        candles: Arc<dyn CandleStore>,
        cursor: Arc<dyn ResumeStateStore>,
        registry: Arc<ModelRegistry>,
        sink: Arc<dyn ObservationSink>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            policy: RetrainPolicy::from(&settings),
            settings,
            candles,
            cursor,
            registry,
            sink,
            controller: Arc::new(LoopController::new()),
            buffer: Vec::new(),
            since_cluster_retrain: 0,
            tracker: AccuracyTracker::default(),
        }
    }

    pub fn with_controller(mut self, controller: Arc<LoopController>) -> Self {
        self.controller = controller;
        self
    }

    pub fn controller(&self) -> Arc<LoopController> {
        Arc::clone(&self.controller)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn candles_since_cluster_retrain(&self) -> usize {
        self.since_cluster_retrain
    }

    pub fn tracker(&self) -> &AccuracyTracker {
        &self.tracker
    }

    /// Train whichever model slot is absent. A no-op when both are present.
    pub async fn bootstrap(&mut self) -> Result<BootstrapReport> {
        self.controller.set_phase(LoopPhase::Bootstrap).await;
        self.cursor.ensure_initialized(&self.symbol).await?;

        let mut report = BootstrapReport::default();
        let need_classifier = !self.registry.classifier_exists().await;
        let need_clusterer = !self.registry.clusterer_exists().await;
        if !need_classifier && !need_clusterer {
            info!("[{}] Models already present, skipping bootstrap training", self.symbol);
            return Ok(report);
        }

        let history = self.candles.get_candles(&self.symbol).await?;
        info!("[{}] Loaded {} candles for bootstrap", self.symbol, history.len());
        if history.len() < self.settings.min_bootstrap_candles {
            return Err(LearnerError::InsufficientData(format!(
                "{} has {} candles, bootstrap needs at least {}",
                self.symbol,
                history.len(),
                self.settings.min_bootstrap_candles
            )));
        }

        let window = self.settings.initial_window.min(history.len());
        if need_classifier {
            info!(
                "[{}] No classifier found, training on the first {} candles",
                self.symbol, window
            );
            self.registry
                .train_classifier(build_labeled_samples(&history[..window]))
                .await?;
            report.classifier_trained = true;
        }

        if need_clusterer {
            let k = self.settings.cluster_count;
            let slice = clustering_slice(&history, self.settings.initial_window, k);
            info!(
                "[{}] No clusterer found, training k={} on {} candles",
                self.symbol,
                k,
                slice.len()
            );
            self.registry.train_clusterer(build_unlabeled(slice), k).await?;
            report.clusterer_trained = true;
        }

        Ok(report)
    }

    /// One pass over every candle newer than the cursor
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        let cursor = match self.cursor.get_cursor(&self.symbol).await? {
            Some(t) => t,
            None => match self.candles.max_close_time(&self.symbol).await? {
                Some(latest) => {
                    // Existing history is never replayed on first run
                    self.cursor.set_cursor(&self.symbol, latest).await?;
                    info!("[{}] No previous cursor, starting after {}", self.symbol, latest);
                    latest
                }
                None => {
                    debug!("[{}] Candle store is empty", self.symbol);
                    self.controller.set_phase(LoopPhase::SteadyState).await;
                    return Ok(IterationOutcome::Idle);
                }
            },
        };

        let batch = self.candles.get_candles_after(&self.symbol, cursor).await?;
        self.controller.set_phase(LoopPhase::for_batch(batch.len())).await;
        if batch.is_empty() {
            return Ok(IterationOutcome::Idle);
        }
        debug!("[{}] {} new candles after {}", self.symbol, batch.len(), cursor);

        for (i, candle) in batch.iter().enumerate() {
            let predecessor = match i {
                0 => self.candles.candle_before(&self.symbol, candle.close_time).await?,
                _ => Some(batch[i - 1].clone()),
            };
            self.process_candle(candle, predecessor.as_ref()).await?;
        }

        if let Some(accuracy) = self.tracker.rolling_accuracy() {
            info!(
                "[{}] Processed {} candles, rolling accuracy {:.1}% over {} observations, buffer {}/{}",
                self.symbol,
                batch.len(),
                accuracy * 100.0,
                self.tracker.window_len(),
                self.buffer.len(),
                self.policy.classifier_threshold
            );
        }
        Ok(IterationOutcome::Processed(batch.len()))
    }

    async fn process_candle(&mut self, candle: &Candle, predecessor: Option<&Candle>) -> Result<()> {
        let Some(prev) = predecessor else {
            self.cursor.set_cursor(&self.symbol, candle.close_time).await?;
            self.controller.record_processed();
            debug!("[{}] {} has no predecessor, skipped", self.symbol, candle.close_time);
            return Ok(());
        };

        let features = CandleFeatures::from_candle(prev);
        let prediction = self.registry.predict_direction(&features).await?;
        let actual = candle.is_bullish();

        let observation = Observation {
            symbol: self.symbol.clone(),
            timestamp: candle.close_time,
            predicted_label: prediction.label,
            probability: prediction.probability,
            actual_label: actual,
        };
        if let Err(e) = self.sink.record(&observation).await {
            warn!("[{}] Failed to record observation at {}: {}", self.symbol, candle.close_time, e);
        }

        self.cursor.set_cursor(&self.symbol, candle.close_time).await?;

        if prediction.label != actual {
            self.buffer.push(LabeledSample::new(features, actual));
        }
        self.since_cluster_retrain += 1;
        self.tracker.record(prediction.label, actual);
        self.controller.record_processed();
        self.controller.record_observation();

        self.maybe_retrain().await;
        Ok(())
    }

    async fn maybe_retrain(&mut self) {
        if self.policy.classifier_due(self.buffer.len()) {
            info!(
                "[{}] Retrain threshold reached ({}), rebuilding classifier training set",
                self.symbol,
                self.buffer.len()
            );
            match self.retrain_classifier().await {
                Ok(version) => {
                    self.buffer.clear();
                    self.controller.record_classifier_retrain();
                    info!(
                        "[{}] Classifier v{} trained, rolling accuracy before retrain {}",
                        self.symbol,
                        version,
                        format_accuracy(self.tracker.rolling_accuracy())
                    );
                }
                Err(e) => warn!(
                    "[{}] Classifier retrain failed, keeping {} buffered samples: {}",
                    self.symbol,
                    self.buffer.len(),
                    e
                ),
            }
        }

        if self.policy.clusterer_due(self.since_cluster_retrain) {
            info!("[{}] Retraining clusterer after {} candles", self.symbol, self.since_cluster_retrain);
            match self.retrain_clusterer().await {
                Ok(version) => {
                    self.since_cluster_retrain = 0;
                    self.controller.record_clusterer_retrain();
                    info!("[{}] Clusterer v{} trained", self.symbol, version);
                }
                Err(e) => warn!(
                    "[{}] Clusterer retrain failed, counter stays at {}: {}",
                    self.symbol, self.since_cluster_retrain, e
                ),
            }
        }
    }

    async fn retrain_classifier(&self) -> Result<ModelVersion> {
        let history = self.candles.get_candles(&self.symbol).await?;
        let window = match self.settings.classifier_training_cap {
            Some(cap) if history.len() > cap => &history[history.len() - cap..],
            _ => &history[..],
        };
        self.registry.train_classifier(build_labeled_samples(window)).await
    }

    async fn retrain_clusterer(&self) -> Result<ModelVersion> {
        let history = self.candles.get_candles(&self.symbol).await?;
        let k = self.settings.cluster_count;
        let slice = clustering_slice(&history, self.settings.initial_window, k);
        self.registry.train_clusterer(build_unlabeled(slice), k).await
    }

    /// Bootstrap until it succeeds, pausing between retryable failures.
    /// `Ok(None)` when the loop was stopped first.
    pub async fn bootstrap_with_retry(&mut self) -> Result<Option<BootstrapReport>> {
        while self.controller.is_running() {
            match self.bootstrap().await {
                Ok(report) => return Ok(Some(report)),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "[{}] Bootstrap failed, retrying in {}s: {}",
                        self.symbol, self.settings.batch_pause_secs, e
                    );
                    tokio::time::sleep(self.settings.batch_pause()).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Bootstrap, then poll forever. Iteration errors are logged and retried.
    pub async fn run(&mut self) -> Result<()> {
        if self.bootstrap_with_retry().await?.is_none() {
            info!("[{}] Stopped before bootstrap completed", self.symbol);
            return Ok(());
        }
        info!("[{}] Entering learning loop", self.symbol);

        while self.controller.is_running() {
            let pause = match self.run_iteration().await {
                Ok(IterationOutcome::Idle) => self.settings.idle_poll(),
                Ok(IterationOutcome::Processed(_)) => self.settings.batch_pause(),
                Err(e @ LearnerError::ModelNotLoaded(_)) => {
                    error!("[{}] {} during prediction", self.symbol, e);
                    self.settings.batch_pause()
                }
                Err(e) => {
                    warn!("[{}] Learning iteration failed (retryable: {}): {}", self.symbol, e.is_retryable(), e);
                    self.settings.batch_pause()
                }
            };
            tokio::time::sleep(pause).await;
        }

        info!(
            "[{}] Learning loop stopped after {} observations, lifetime accuracy {}",
            self.symbol,
            self.tracker.total(),
            format_accuracy(self.tracker.lifetime_accuracy())
        );
        Ok(())
    }
}

fn format_accuracy(accuracy: Option<f64>) -> String {
    accuracy
        .map(|a| format!("{:.1}%", a * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}
