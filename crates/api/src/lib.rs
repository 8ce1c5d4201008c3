//! Alert Engine API Server
//!
//! REST control surface over the alert engine: alert lifecycle, rule
//! management, metric history and gauge ingestion, health and Prometheus
//! scraping.

use axum::{
    extract::State,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod error;
mod stats;

mod routes {
    pub mod alerts;
    pub mod metrics;
    pub mod rules;
}

pub use error::ApiError;
pub use stats::{track_requests, RequestStats};

use alert_scheduler::{GaugeSet, HealthProbe, HealthStatus, MetricCollector};
use alerting::{AlertEngine, LoggingConfig};
use async_trait::async_trait;

/// Handler state
pub type SharedState = Arc<AppState>;

/// Liveness of this process as seen by the health rule
#[derive(Debug, Default)]
pub struct ServerProbe {
    serving: AtomicBool,
}

impl ServerProbe {
    pub fn set_serving(&self, serving: bool) {
        self.serving.store(serving, Ordering::Relaxed);
    }
}

#[async_trait]
impl HealthProbe for ServerProbe {
    async fn simple_status(&self) -> HealthStatus {
        if self.serving.load(Ordering::Relaxed) {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub engine: AlertEngine,
    /// Host gauges pushed by external samplers
    pub system_gauges: Arc<GaugeSet>,
    pub request_stats: Arc<RequestStats>,
    pub probe: Arc<ServerProbe>,
    pub prometheus: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: AlertEngine) -> Self {
        Self {
            engine,
            system_gauges: Arc::new(GaugeSet::new("system")),
            request_stats: Arc::new(RequestStats::new()),
            probe: Arc::new(ServerProbe::default()),
            prometheus: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Collector over every producer this process owns
    pub fn metric_collector(&self) -> MetricCollector {
        MetricCollector::new(self.engine.config().source_timeout())
            .with_source(self.system_gauges.clone())
            .with_source(self.request_stats.clone())
            .with_probe(self.probe.clone())
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_alerts: usize,
    pub rules: usize,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/alerts",
            get(routes::alerts::list_active).post(routes::alerts::create),
        )
        .route("/api/v1/alerts/summary", get(routes::alerts::summary))
        .route("/api/v1/alerts/:id", get(routes::alerts::get_one))
        .route("/api/v1/alerts/:id/acknowledge", post(routes::alerts::acknowledge))
        .route("/api/v1/alerts/:id/resolve", post(routes::alerts::resolve))
        .route("/api/v1/alerts/:id/comments", post(routes::alerts::comment))
        .route(
            "/api/v1/rules",
            get(routes::rules::list).post(routes::rules::create),
        )
        .route(
            "/api/v1/rules/:id",
            patch(routes::rules::toggle).delete(routes::rules::remove),
        )
        .route("/api/v1/metrics/:name", get(routes::metrics::history))
        .route("/api/v1/gauges", post(routes::metrics::push_gauges))
        .route("/metrics", get(routes::metrics::prometheus))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.probe.simple_status().await,
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_alerts: state.engine.get_active_alerts().await.len(),
        rules: state.engine.rules().len().await,
    })
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Serve until `shutdown` completes
pub async fn run_server<F>(state: SharedState, addr: &str, shutdown: F) -> Result<(), ApiError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting API server on {}", listener.local_addr()?);
    state.probe.set_serving(true);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    state.probe.set_serving(false);
    info!("API server stopped");
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{EngineConfig, MemoryNotifier};
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state() -> SharedState {
        let engine = AlertEngine::new(
            EngineConfig {
                seed_default_rules: false,
                ..Default::default()
            },
            Arc::new(MemoryNotifier::new()),
        );
        Arc::new(AppState::new(engine))
    }

    async fn call(
        state: &SharedState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn manual_alert() -> Value {
        json!({
            "title": "Checkout latency",
            "description": "p99 above 3s",
            "severity": "warning",
            "category": "performance",
            "source": "manual"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");

        state.probe.set_serving(true);
        let (_, body) = call(&state, Method::GET, "/api/v1/health", None).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_alerts"], 0);
    }

    #[tokio::test]
    async fn test_alert_lifecycle_routes() {
        let state = state();

        let (status, created) =
            call(&state, Method::POST, "/api/v1/alerts", Some(manual_alert())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "active");
        let id = created["id"].as_str().unwrap().to_string();

        let (_, list) = call(&state, Method::GET, "/api/v1/alerts", None).await;
        assert_eq!(list["count"], 1);
        let uri = "/api/v1/alerts?min_severity=critical";
        let (_, filtered) = call(&state, Method::GET, uri, None).await;
        assert_eq!(filtered["count"], 0);

        let (status, acked) = call(
            &state,
            Method::POST,
            &format!("/api/v1/alerts/{}/acknowledge", id),
            Some(json!({ "user": "oncall" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(acked["status"], "acknowledged");
        assert_eq!(acked["assigned_to"], "oncall");

        let (_, commented) = call(
            &state,
            Method::POST,
            &format!("/api/v1/alerts/{}/comments", id),
            Some(json!({ "user": "oncall", "comment": "rolling back deploy" })),
        )
        .await;
        assert_eq!(commented["actions"].as_array().unwrap().len(), 3);

        let (_, resolved) = call(
            &state,
            Method::POST,
            &format!("/api/v1/alerts/{}/resolve", id),
            Some(json!({ "user": "oncall", "comment": "rolled back" })),
        )
        .await;
        assert_eq!(resolved["status"], "resolved");

        let (_, summary) = call(&state, Method::GET, "/api/v1/alerts/summary", None).await;
        assert_eq!(summary["total"], 1);
        assert_eq!(summary["by_status"]["resolved"], 1);
    }

    #[tokio::test]
    async fn test_unknown_alert_is_404() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/api/v1/alerts/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nope"));

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/alerts/nope/acknowledge",
            Some(json!({ "user": "oncall" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rule_routes() {
        let state = state();
        let rule = json!({
            "name": "Failed payments",
            "category": "business",
            "severity": "error",
            "condition": {
                "metric": "payments.failed",
                "operator": "gte",
                "threshold": 10.0,
                "duration_minutes": 5,
                "evaluation_window_minutes": 10
            },
            "notification_channels": ["email"]
        });

        let (status, created) = call(&state, Method::POST, "/api/v1/rules", Some(rule)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["enabled"], true);
        assert_eq!(created["cooldown_minutes"], 30);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, toggled) = call(
            &state,
            Method::PATCH,
            &format!("/api/v1/rules/{}", id),
            Some(json!({ "enabled": false })),
        )
        .await;
        assert_eq!(toggled["enabled"], false);

        let rule_uri = format!("/api/v1/rules/{}", id);
        let (status, _) = call(&state, Method::DELETE, &rule_uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, rules) = call(&state, Method::GET, "/api/v1/rules", None).await;
        assert_eq!(rules.as_array().unwrap().len(), 0);

        let rule_uri = format!("/api/v1/rules/{}", id);
        let (status, _) = call(&state, Method::DELETE, &rule_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_400() {
        let state = state();
        let rule = json!({
            "name": " ",
            "category": "business",
            "severity": "error",
            "condition": {
                "metric": "payments.failed",
                "operator": "gte",
                "threshold": 10.0,
                "duration_minutes": 5,
                "evaluation_window_minutes": 10
            }
        });
        let (status, _) = call(&state, Method::POST, "/api/v1/rules", Some(rule)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gauges_and_history() {
        let state = state();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/gauges",
            Some(json!({ "cpu.usage": 91.5, "memory.usage": 40.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 2);
        assert_eq!(state.system_gauges.snapshot()["cpu.usage"], 91.5);

        let now = Utc::now();
        state.engine.history().record("cpu.usage", now, 91.5).unwrap();
        let uri = "/api/v1/metrics/cpu.usage?minutes=5";
        let (status, body) = call(&state, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["samples"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_requests_feed_application_metrics() {
        let state = state();
        call(&state, Method::GET, "/api/v1/health", None).await;
        call(&state, Method::GET, "/api/v1/alerts/missing", None).await;

        let snapshot = state.metric_collector().collect().await;
        assert_eq!(snapshot["requests.total"], 2.0);
        assert_eq!(snapshot["requests.errorRate"], 0.0);
        assert_eq!(snapshot["health_status"], 0.0);
    }

    #[tokio::test]
    async fn test_prometheus_without_recorder() {
        let state = state();
        let (status, _) = call(&state, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
