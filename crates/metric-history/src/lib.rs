//! Metric History
//!
//! Rolling per-metric time series used to decide whether an alert condition
//! has persisted. Samples older than the retention window are pruned on write.

mod history;

pub use history::{MetricHistory, DEFAULT_RETENTION_MINUTES};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single recorded metric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History lock poisoned: {0}")]
    LockPoisoned(String),
}
