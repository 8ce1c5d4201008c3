//! Metric History Implementation

use crate::{HistoryError, MetricSample};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Default retention window (60 minutes)
pub const DEFAULT_RETENTION_MINUTES: u32 = 60;

struct Inner {
    /// Samples per metric, in insertion order
    series: HashMap<String, VecDeque<MetricSample>>,
    /// Newest timestamp ever recorded, used to hide expired samples from reads
    newest: Option<DateTime<Utc>>,
}

impl Inner {
    /// Oldest timestamp still visible to reads
    fn expiry(&self, retention: Duration) -> Option<DateTime<Utc>> {
        self.newest.map(|newest| newest - retention)
    }

    /// Retained samples of one metric that have not expired
    fn visible<'a>(
        &'a self,
        metric: &str,
        retention: Duration,
    ) -> impl DoubleEndedIterator<Item = &'a MetricSample> + 'a {
        let expiry = self.expiry(retention);
        self.series
            .get(metric)
            .into_iter()
            .flatten()
            .filter(move |s| expiry.map_or(true, |cutoff| s.timestamp >= cutoff))
    }
}

/// Thread-safe rolling history of metric samples keyed by metric name
pub struct MetricHistory {
    inner: Mutex<Inner>,
    retention: Duration,
}

impl MetricHistory {
    /// Create a history with the given retention window in minutes
    pub fn new(retention_minutes: u32) -> Self {
        debug!("Creating metric history with {} minute retention", retention_minutes);
        Self {
            inner: Mutex::new(Inner {
                series: HashMap::new(),
                newest: None,
            }),
            retention: Duration::minutes(i64::from(retention_minutes)),
        }
    }

    /// Create a history with the default 60 minute retention
    pub fn with_default_retention() -> Self {
        Self::new(DEFAULT_RETENTION_MINUTES)
    }

    /// Retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, HistoryError> {
        self.inner
            .lock()
            .map_err(|e| HistoryError::LockPoisoned(e.to_string()))
    }

    /// Append a sample and prune that metric's samples older than the retention window
    pub fn record(
        &self,
        metric: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<(), HistoryError> {
        let mut inner = self.lock()?;
        let cutoff = timestamp - self.retention;

        inner.newest = Some(match inner.newest {
            Some(newest) if newest > timestamp => newest,
            _ => timestamp,
        });

        let series = inner.series.entry(metric.to_string()).or_default();
        series.push_back(MetricSample::new(timestamp, value));

        let before = series.len();
        series.retain(|s| s.timestamp >= cutoff);
        let pruned = before - series.len();
        if pruned > 0 {
            trace!(metric, pruned, "Pruned expired samples");
        }

        Ok(())
    }

    /// Samples with `timestamp >= since`, in insertion order
    ///
    /// Samples that have fallen out of the retention window relative to the
    /// newest recorded timestamp are never returned, even if their series has
    /// not been written to since.
    pub fn query(
        &self,
        metric: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, HistoryError> {
        let inner = self.lock()?;
        Ok(inner
            .visible(metric, self.retention)
            .filter(|s| s.timestamp >= since)
            .copied()
            .collect())
    }

    /// Most recently inserted unexpired sample for a metric
    pub fn latest(&self, metric: &str) -> Result<Option<MetricSample>, HistoryError> {
        let inner = self.lock()?;
        let latest = inner.visible(metric, self.retention).next_back().copied();
        Ok(latest)
    }

    /// Drop expired samples across every series and remove empty series
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, HistoryError> {
        let mut inner = self.lock()?;
        let cutoff = now - self.retention;
        let mut removed = 0;

        inner.series.retain(|_, series| {
            let before = series.len();
            series.retain(|s| s.timestamp >= cutoff);
            removed += before - series.len();
            !series.is_empty()
        });

        if removed > 0 {
            debug!("Pruned {} expired samples", removed);
        }
        Ok(removed)
    }

    /// Names of metrics with unexpired samples, sorted
    pub fn metric_names(&self) -> Result<Vec<String>, HistoryError> {
        let inner = self.lock()?;
        let mut names: Vec<String> = inner
            .series
            .keys()
            .filter(|name| inner.visible(name, self.retention).next().is_some())
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    /// Number of unexpired samples for a metric
    pub fn len(&self, metric: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.visible(metric, self.retention).count())
            .unwrap_or(0)
    }

    /// Whether no unexpired samples remain in any series
    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .series
                    .keys()
                    .all(|name| inner.visible(name, self.retention).next().is_none())
            })
            .unwrap_or(true)
    }

    /// Clear all series
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.series.clear();
            inner.newest = None;
        }
    }
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::with_default_retention()
    }
}
