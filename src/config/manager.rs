use config::{Config, Environment, File};
use tracing::{debug, info};

use super::runtime::LearnerConfig;
use crate::error::{LearnerError, Result};

/// Environment prefix for overrides, e.g. `LEARNER__LEARNING__CLUSTER_COUNT=8`
pub const ENV_PREFIX: &str = "LEARNER";

/// Load configuration from an optional TOML file plus environment overrides.
/// Missing keys fall back to defaults; the result is validated.
pub fn load_config(path: &str) -> Result<LearnerConfig> {
    if let Ok(env_file) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", env_file.display());
    }

    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| LearnerError::Config(e.to_string()))?;

    let config: LearnerConfig = settings
        .try_deserialize()
        .map_err(|e| LearnerError::Config(e.to_string()))?;

    config
        .validate()
        .map_err(|errors| LearnerError::Config(errors.join(", ")))?;

    info!(
        "Configuration loaded: symbol={}, initial_window={}, retrain_threshold={}, cluster_interval={}, k={}",
        config.symbol,
        config.learning.initial_window,
        config.learning.classifier_retrain_threshold,
        config.learning.clusterer_retrain_interval,
        config.learning.cluster_count
    );
    Ok(config)
}

/// Render the effective configuration as TOML
pub fn render_config(config: &LearnerConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| LearnerError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LearnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning.initial_window, 35_000);
        assert_eq!(config.learning.classifier_retrain_threshold, 200);
        assert_eq!(config.learning.clusterer_retrain_interval, 1_000);
        assert_eq!(config.learning.cluster_count, 5);
        assert_eq!(config.learning.idle_poll_secs, 10);
        assert_eq!(config.learning.batch_pause_secs, 5);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = LearnerConfig::default();
        config.learning.classifier_retrain_threshold = 0;
        config.learning.cluster_count = 0;
        config.fetcher.interval = "7h".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("cluster_count")));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learner.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "symbol = \"ETHUSDT\"").unwrap();
        writeln!(file, "[learning]").unwrap();
        writeln!(file, "cluster_count = 8").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.learning.cluster_count, 8);
        assert_eq!(config.learning.classifier_retrain_threshold, 200);
        assert_eq!(config.fetcher.page_limit, 1000);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[learning]\ninitial_window = 0\n").unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, LearnerError::Config(_)));
    }

    #[test]
    fn test_render_round_trips_through_toml() {
        let config = LearnerConfig::default();
        let rendered = render_config(&config).unwrap();
        assert!(rendered.contains("[learning]"));
        let parsed: LearnerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.symbol, config.symbol);
    }
}
