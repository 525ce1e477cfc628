use std::collections::VecDeque;
use tracing::debug;

/// Rolling record of direction predictions against realized outcomes.
/// Reported in logs only; retrain decisions never consult it.
pub struct AccuracyTracker {
    /// (predicted_green, actual_green), oldest first
    window: VecDeque<(bool, bool)>,
    capacity: usize,
    total: u64,
    total_correct: u64,
}

impl AccuracyTracker {
    pub const DEFAULT_WINDOW: usize = 500;

    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total: 0,
            total_correct: 0,
        }
    }

    pub fn record(&mut self, predicted: bool, actual: bool) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((predicted, actual));
        self.total += 1;
        if predicted == actual {
            self.total_correct += 1;
        }
        debug!("Accuracy tracker: predicted={} actual={}", predicted, actual);
    }

    /// Hit rate over the rolling window, `None` before the first record
    pub fn rolling_accuracy(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let hits = self.window.iter().filter(|(p, a)| p == a).count();
        Some(hits as f64 / self.window.len() as f64)
    }

    pub fn lifetime_accuracy(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.total_correct as f64 / self.total as f64)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

impl Default for AccuracyTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
