use crate::config::LearningSettings;

/// Classifier retrain is due once the correction buffer reaches `threshold`
pub fn should_retrain_classifier(buffer_size: usize, threshold: usize) -> bool {
    buffer_size >= threshold
}

/// Clusterer retrain is due once `interval` candles were processed since the last one
pub fn should_retrain_clusterer(candles_since_last_retrain: usize, interval: usize) -> bool {
    candles_since_last_retrain >= interval
}

/// Retrain thresholds, fixed for the lifetime of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrainPolicy {
    pub classifier_threshold: usize,
    pub clusterer_interval: usize,
}

impl RetrainPolicy {
    pub fn classifier_due(&self, buffer_size: usize) -> bool {
        should_retrain_classifier(buffer_size, self.classifier_threshold)
    }

    pub fn clusterer_due(&self, candles_since_last_retrain: usize) -> bool {
        should_retrain_clusterer(candles_since_last_retrain, self.clusterer_interval)
    }
}

impl From<&LearningSettings> for RetrainPolicy {
    fn from(settings: &LearningSettings) -> Self {
        Self {
            classifier_threshold: settings.classifier_retrain_threshold,
            clusterer_interval: settings.clusterer_retrain_interval,
        }
    }
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self::from(&LearningSettings::default())
    }
}
