use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Lifecycle of the learning loop. CatchUp and SteadyState run the same
/// logic and differ only in backlog size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Bootstrap,
    CatchUp,
    SteadyState,
}

impl LoopPhase {
    /// Phase implied by the size of a freshly fetched batch
    pub fn for_batch(len: usize) -> Self {
        if len > 1 {
            LoopPhase::CatchUp
        } else {
            LoopPhase::SteadyState
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopPhase::Bootstrap => write!(f, "BOOTSTRAP"),
            LoopPhase::CatchUp => write!(f, "CATCH_UP"),
            LoopPhase::SteadyState => write!(f, "STEADY_STATE"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopState {
    pub phase: LoopPhase,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub candles_processed: u64,
    pub observations: u64,
    pub classifier_retrains: u64,
    pub clusterer_retrains: u64,
}

pub struct LoopController {
    running: AtomicBool,
    phase: RwLock<LoopPhase>,
    started_at: DateTime<Utc>,
    candles_processed: AtomicU64,
    observations: AtomicU64,
    classifier_retrains: AtomicU64,
    clusterer_retrains: AtomicU64,
    phase_tx: broadcast::Sender<LoopPhase>,
}

impl LoopController {
    pub fn new() -> Self {
        let (phase_tx, _) = broadcast::channel(32);
        Self {
            running: AtomicBool::new(true),
            phase: RwLock::new(LoopPhase::Bootstrap),
            started_at: Utc::now(),
            candles_processed: AtomicU64::new(0),
            observations: AtomicU64::new(0),
            classifier_retrains: AtomicU64::new(0),
            clusterer_retrains: AtomicU64::new(0),
            phase_tx,
        }
    }

    pub async fn phase(&self) -> LoopPhase {
        *self.phase.read().await
    }

    /// Record a phase; subscribers only hear about actual transitions
    pub async fn set_phase(&self, next: LoopPhase) {
        let mut phase = self.phase.write().await;
        if *phase != next {
            *phase = next;
            let _ = self.phase_tx.send(next);
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        info!("Learning loop stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn record_processed(&self) {
        self.candles_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observation(&self) {
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_retrain(&self) {
        self.classifier_retrains.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_clusterer_retrain(&self) {
        self.clusterer_retrains.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get_state(&self) -> LoopState {
        LoopState {
            phase: self.phase().await,
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            candles_processed: self.candles_processed.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            classifier_retrains: self.classifier_retrains.load(Ordering::Relaxed),
            clusterer_retrains: self.clusterer_retrains.load(Ordering::Relaxed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopPhase> {
        self.phase_tx.subscribe()
    }
}

impl Default for LoopController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_for_batch() {
        assert_eq!(LoopPhase::for_batch(0), LoopPhase::SteadyState);
        assert_eq!(LoopPhase::for_batch(1), LoopPhase::SteadyState);
        assert_eq!(LoopPhase::for_batch(2), LoopPhase::CatchUp);
    }

    #[tokio::test]
    async fn test_only_transitions_are_broadcast() {
        let controller = LoopController::new();
        let mut rx = controller.subscribe();

        controller.set_phase(LoopPhase::Bootstrap).await;
        controller.set_phase(LoopPhase::CatchUp).await;
        controller.set_phase(LoopPhase::CatchUp).await;
        controller.set_phase(LoopPhase::SteadyState).await;

        assert_eq!(rx.recv().await.unwrap(), LoopPhase::CatchUp);
        assert_eq!(rx.recv().await.unwrap(), LoopPhase::SteadyState);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_counters() {
        let controller = LoopController::new();
        controller.record_processed();
        controller.record_processed();
        controller.record_observation();
        controller.record_classifier_retrain();

        let state = controller.get_state().await;
        assert_eq!(state.phase, LoopPhase::Bootstrap);
        assert_eq!(state.candles_processed, 2);
        assert_eq!(state.observations, 1);
        assert_eq!(state.classifier_retrains, 1);
        assert_eq!(state.clusterer_retrains, 0);
        assert!(controller.is_running());

        controller.stop();
        assert!(!controller.is_running());
    }
}
