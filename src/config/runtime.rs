use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::TimeFrame;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub symbol: String,
    pub database_url: String,
    pub models_dir: String,
    pub learning: LearningSettings,
    pub fetcher: FetcherSettings,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            database_url: "sqlite:./candle_learner.db".to_string(),
            models_dir: "./trained".to_string(),
            learning: LearningSettings::default(),
            fetcher: FetcherSettings::default(),
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.symbol.trim().is_empty() {
            errors.push("symbol must not be empty".to_string());
        }
        if self.database_url.trim().is_empty() {
            errors.push("database_url must not be empty".to_string());
        }

        // Learning validation
        let learning = &self.learning;
        if learning.initial_window == 0 {
            errors.push("learning.initial_window must be > 0".to_string());
        }
        if learning.classifier_retrain_threshold == 0 {
            errors.push("learning.classifier_retrain_threshold must be > 0".to_string());
        }
        if learning.clusterer_retrain_interval == 0 {
            errors.push("learning.clusterer_retrain_interval must be > 0".to_string());
        }
        if learning.cluster_count == 0 {
            errors.push("learning.cluster_count must be >= 1".to_string());
        }
        if learning.min_bootstrap_candles < 2 {
            errors.push("learning.min_bootstrap_candles must be >= 2".to_string());
        }
        if learning.classifier_training_cap == Some(0) {
            errors.push("learning.classifier_training_cap must be > 0 when set".to_string());
        }

        // Fetcher validation
        if self.fetcher.timeframe().is_err() {
            errors.push(format!("fetcher.interval '{}' is not a known interval", self.fetcher.interval));
        }
        if self.fetcher.history_start().is_err() {
            errors.push(format!("fetcher.history_start '{}' must be YYYY-MM-DD", self.fetcher.history_start));
        }
        if self.fetcher.page_limit == 0 || self.fetcher.page_limit > 1000 {
            errors.push("fetcher.page_limit must be between 1 and 1000".to_string());
        }
        if self.fetcher.requests_per_second == 0 {
            errors.push("fetcher.requests_per_second must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// Candles used for the first supervised fit
    pub initial_window: usize,
    pub classifier_retrain_threshold: usize,
    pub clusterer_retrain_interval: usize,
    pub cluster_count: usize,
    /// Wait when no new candles are found
    pub idle_poll_secs: u64,
    /// Wait after a processed batch or a failed iteration
    pub batch_pause_secs: u64,
    pub min_bootstrap_candles: usize,
    /// Most recent candles used by classifier retrains; unset means full history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_training_cap: Option<usize>,
    pub record_observations: bool,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            initial_window: 35_000,
            classifier_retrain_threshold: 200,
            clusterer_retrain_interval: 1_000,
            cluster_count: 5,
            idle_poll_secs: 10,
            batch_pause_secs: 5,
            min_bootstrap_candles: 10,
            classifier_training_cap: None,
            record_observations: true,
        }
    }
}

impl LearningSettings {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub base_url: String,
    pub interval: String,
    pub history_start: String,
    pub page_limit: u32,
    pub live_poll_secs: u64,
    pub requests_per_second: u32,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            interval: "1h".to_string(),
            history_start: "2017-08-17".to_string(),
            page_limit: 1000,
            live_poll_secs: 1,
            requests_per_second: 10,
        }
    }
}

impl FetcherSettings {
    pub fn timeframe(&self) -> Result<TimeFrame, String> {
        self.interval.parse()
    }

    /// Midnight UTC of the configured first history day
    pub fn history_start(&self) -> Result<DateTime<Utc>, String> {
        let date = NaiveDate::parse_from_str(&self.history_start, "%Y-%m-%d")
            .map_err(|e| format!("invalid history_start: {}", e))?;
        date.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| "invalid history_start".to_string())
    }

    pub fn live_poll(&self) -> Duration {
        Duration::from_secs(self.live_poll_secs)
    }
}
