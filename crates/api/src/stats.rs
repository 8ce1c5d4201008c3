//! Request statistics
//!
//! An axum middleware feeds every response into [`RequestStats`]; the rule
//! evaluation scheduler samples it as the `application` metrics source. Rates
//! cover the requests seen since the previous sample.

use crate::SharedState;
use alert_scheduler::{MetricSnapshot, MetricsSource, SourceError};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const REQUESTS_TOTAL: &str = "requests.total";
pub const REQUESTS_ERROR_RATE: &str = "requests.errorRate";
pub const RESPONSES_AVERAGE_TIME: &str = "responses.averageTime";

#[derive(Debug, Default)]
struct Window {
    requests: u64,
    errors: u64,
    latency_ms: f64,
}

/// Counters behind the application gauges
#[derive(Debug, Default)]
pub struct RequestStats {
    total: AtomicU64,
    window: Mutex<Window>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished request; 5xx responses count as errors
    pub fn record(&self, status: StatusCode, elapsed: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut window) = self.window.lock() {
            window.requests += 1;
            if status.is_server_error() {
                window.errors += 1;
            }
            window.latency_ms += elapsed.as_secs_f64() * 1000.0;
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetricsSource for RequestStats {
    fn name(&self) -> &str {
        "application"
    }

    async fn collect(&self) -> Result<MetricSnapshot, SourceError> {
        let window = {
            let mut window = self
                .window
                .lock()
                .map_err(|e| SourceError::Unavailable(self.name().to_string(), e.to_string()))?;
            std::mem::take(&mut *window)
        };

        let (error_rate, average_time) = if window.requests == 0 {
            (0.0, 0.0)
        } else {
            let requests = window.requests as f64;
            (
                window.errors as f64 / requests * 100.0,
                window.latency_ms / requests,
            )
        };

        Ok(MetricSnapshot::from([
            (REQUESTS_TOTAL.to_string(), self.total() as f64),
            (REQUESTS_ERROR_RATE.to_string(), error_rate),
            (RESPONSES_AVERAGE_TIME.to_string(), average_time),
        ]))
    }
}

/// Middleware recording status and latency of every request
pub async fn track_requests(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(response.status(), started.elapsed());
    response
}
