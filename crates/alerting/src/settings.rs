//! Engine settings
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed with `ALERT_ENGINE_` (nested keys use `__`, e.g.
//! `ALERT_ENGINE_SERVER__BIND_ADDRESS`).

use crate::notify::ChannelConfig;
use crate::summary::SummaryOptions;
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Alert engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule evaluation tick (seconds)
    pub evaluation_interval_secs: u64,
    /// Escalation check tick (seconds)
    pub escalation_interval_secs: u64,
    /// Upper bound for each metric producer call (milliseconds)
    pub source_timeout_ms: u64,
    /// Upper bound for each channel delivery (milliseconds)
    pub notification_timeout_ms: u64,
    /// Metric history retention (minutes)
    pub history_retention_minutes: u32,
    /// Alerts kept in memory before the oldest resolved ones are evicted
    pub max_retained_alerts: usize,
    pub recent_alert_limit: usize,
    pub recent_alert_window_hours: u32,
    pub top_issue_limit: usize,
    /// Load the standard platform rules at startup
    pub seed_default_rules: bool,
    pub channels: Vec<ChannelConfig>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 60,
            escalation_interval_secs: 300,
            source_timeout_ms: 5_000,
            notification_timeout_ms: 5_000,
            history_retention_minutes: 60,
            max_retained_alerts: 10_000,
            recent_alert_limit: 10,
            recent_alert_window_hours: 24,
            top_issue_limit: 5,
            seed_default_rules: true,
            channels: vec![
                ChannelConfig::new("email", &[Severity::Error, Severity::Critical]),
                ChannelConfig::new(
                    "slack",
                    &[Severity::Warning, Severity::Error, Severity::Critical],
                ),
                ChannelConfig::new("webhook", &Severity::ALL),
            ],
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional file plus environment overrides
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("ALERT_ENGINE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the schedulers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation_interval_secs == 0 {
            return Err(ConfigError::Invalid("evaluation_interval_secs must be > 0".into()));
        }
        if self.escalation_interval_secs == 0 {
            return Err(ConfigError::Invalid("escalation_interval_secs must be > 0".into()));
        }
        if self.source_timeout_ms == 0 || self.notification_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".into()));
        }
        if self.history_retention_minutes == 0 {
            return Err(ConfigError::Invalid("history_retention_minutes must be > 0".into()));
        }
        Ok(())
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn escalation_interval(&self) -> Duration {
        Duration::from_secs(self.escalation_interval_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            recent_limit: self.recent_alert_limit,
            recent_window_hours: self.recent_alert_window_hours,
            top_issue_limit: self.top_issue_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.evaluation_interval(), Duration::from_secs(60));
        assert_eq!(config.escalation_interval(), Duration::from_secs(300));
        assert_eq!(config.history_retention_minutes, 60);
        assert_eq!(config.channels.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_keys() {
        let path = std::env::temp_dir().join(format!("alert-engine-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
evaluation_interval_secs = 30
seed_default_rules = false

[server]
bind_address = "127.0.0.1:9000"

[[channels]]
name = "pager"
severities = ["critical"]
"#
        )
        .unwrap();

        let config = EngineConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.evaluation_interval_secs, 30);
        assert_eq!(config.escalation_interval_secs, 300);
        assert!(!config.seed_default_rules);
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.channels.len(), 1);
        assert!(config.channels[0].enabled);
        assert_eq!(config.channels[0].severities, vec![Severity::Critical]);
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("ALERT_ENGINE_RECENT_ALERT_LIMIT", "3");
        std::env::set_var("ALERT_ENGINE_LOGGING__LEVEL", "debug");

        let config = EngineConfig::load(None).unwrap();

        std::env::remove_var("ALERT_ENGINE_RECENT_ALERT_LIMIT");
        std::env::remove_var("ALERT_ENGINE_LOGGING__LEVEL");

        assert_eq!(config.recent_alert_limit, 3);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.evaluation_interval_secs, 60);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = EngineConfig {
            evaluation_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
