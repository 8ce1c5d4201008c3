//! Alerting Error Types

use metric_history::HistoryError;
use thiserror::Error;

/// Errors surfaced by the alerting engine
#[derive(Debug, Error)]
pub enum AlertingError {
    /// No alert with the given id
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    /// No rule with the given id
    #[error("Alert rule not found: {0}")]
    RuleNotFound(String),

    /// Rule definition rejected
    #[error("Invalid alert rule: {0}")]
    InvalidRule(String),

    /// Metric history unavailable
    #[error("Metric history error: {0}")]
    History(#[from] HistoryError),
}
