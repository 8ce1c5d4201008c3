//! Metric Routes
//!
//! History queries for dashboards, gauge ingestion for external samplers,
//! and the Prometheus scrape endpoint.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{ApiError, SharedState};
use alerting::MetricSample;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Look-back in minutes
    #[serde(default = "default_minutes")]
    pub minutes: u32,
}

fn default_minutes() -> u32 {
    60
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub metric: String,
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Serialize)]
pub struct GaugeResponse {
    pub accepted: usize,
}

/// Retained samples of one metric
pub async fn history(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let since = Utc::now() - Duration::minutes(i64::from(params.minutes));
    let samples = state
        .engine
        .history()
        .query(&name, since)
        .map_err(alerting::AlertingError::from)?;

    Ok(Json(HistoryResponse {
        metric: name,
        samples,
    }))
}

/// Replace current values of system gauges
pub async fn push_gauges(
    State(state): State<SharedState>,
    Json(gauges): Json<HashMap<String, f64>>,
) -> Result<(StatusCode, Json<GaugeResponse>), ApiError> {
    if let Some((name, _)) = gauges.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ApiError::BadRequest(format!("gauge {} is not a finite number", name)));
    }

    let accepted = gauges.len();
    state.system_gauges.extend(gauges);
    Ok((StatusCode::ACCEPTED, Json(GaugeResponse { accepted })))
}

/// Prometheus text exposition
pub async fn prometheus(State(state): State<SharedState>) -> (StatusCode, String) {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed\n".into()),
    }
}
