//! Metric producers and the liveness probe
//!
//! Producers are external; this module defines their interface, a shared
//! gauge set they can push into, and the collector that samples all of them
//! with a timeout per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Pseudo-metric carrying the liveness probe result (1 ok, 0 otherwise)
pub const HEALTH_STATUS_METRIC: &str = "health_status";

/// Metric name to current value
pub type MetricSnapshot = HashMap<String, f64>;

/// Producer errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Metric source {0} unavailable: {1}")]
    Unavailable(String, String),

    #[error("Metric source {0} timed out after {1}ms")]
    Timeout(String, u64),
}

/// A producer of numeric gauges
#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &str;

    /// Current snapshot of this producer's gauges
    async fn collect(&self) -> Result<MetricSnapshot, SourceError>;
}

/// Liveness result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

impl HealthStatus {
    pub fn as_metric(&self) -> f64 {
        match self {
            HealthStatus::Ok => 1.0,
            HealthStatus::Error => 0.0,
        }
    }
}

/// Liveness prober
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn simple_status(&self) -> HealthStatus;
}

/// Probe returning a fixed status
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub HealthStatus);

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn simple_status(&self) -> HealthStatus {
        self.0
    }
}

/// Shared in-memory gauges that external samplers push into
#[derive(Debug, Default)]
pub struct GaugeSet {
    name: String,
    values: RwLock<MetricSnapshot>,
}

impl GaugeSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Set a single gauge
    pub fn set(&self, metric: &str, value: f64) {
        if let Ok(mut values) = self.values.write() {
            values.insert(metric.to_string(), value);
        }
    }

    /// Merge several gauges at once
    pub fn extend(&self, gauges: impl IntoIterator<Item = (String, f64)>) {
        if let Ok(mut values) = self.values.write() {
            values.extend(gauges);
        }
    }

    pub fn remove(&self, metric: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(metric);
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MetricsSource for GaugeSet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self) -> Result<MetricSnapshot, SourceError> {
        self.values
            .read()
            .map(|v| v.clone())
            .map_err(|e| SourceError::Unavailable(self.name.clone(), e.to_string()))
    }
}

/// Samples every producer and the probe, each bounded by `timeout`
pub struct MetricCollector {
    sources: Vec<Arc<dyn MetricsSource>>,
    probe: Option<Arc<dyn HealthProbe>>,
    timeout: Duration,
}

impl MetricCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            probe: None,
            timeout,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Merged snapshot of everything that answered in time
    ///
    /// A failing or slow producer contributes nothing; later producers win on
    /// name clashes.
    pub async fn collect(&self) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new();

        for source in &self.sources {
            let result = match tokio::time::timeout(self.timeout, source.collect()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(
                    source.name().to_string(),
                    self.timeout.as_millis() as u64,
                )),
            };

            match result {
                Ok(values) => {
                    debug!(source = source.name(), count = values.len(), "Collected metrics");
                    snapshot.extend(values);
                }
                Err(e) => {
                    metrics::counter!(
                        "alert_engine_source_errors_total",
                        "source" => source.name().to_string()
                    )
                    .increment(1);
                    warn!("Skipping metric source this tick: {}", e);
                }
            }
        }

        if let Some(probe) = &self.probe {
            let status = match tokio::time::timeout(self.timeout, probe.simple_status()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("Health probe timed out, reporting error status");
                    HealthStatus::Error
                }
            };
            snapshot.insert(HEALTH_STATUS_METRIC.to_string(), status.as_metric());
        }

        snapshot
    }
}
