//! Alert Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{ApiError, SharedState};
use alerting::{Alert, AlertSummary, NewAlert, Severity};

/// Query parameters for the active alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Only alerts at or above this severity
    pub min_severity: Option<Severity>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the active alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub data: Vec<Alert>,
    pub count: usize,
}

/// Body of acknowledge and resolve
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub user: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Body of a comment
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub user: String,
    pub comment: String,
}

/// Active alerts, oldest first
pub async fn list_active(
    State(state): State<SharedState>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertListResponse> {
    let alerts: Vec<Alert> = state
        .engine
        .get_active_alerts()
        .await
        .into_iter()
        .filter(|a| params.min_severity.map_or(true, |min| a.severity >= min))
        .take(params.limit)
        .collect();

    Json(AlertListResponse {
        count: alerts.len(),
        data: alerts,
    })
}

/// Create a manual alert
pub async fn create(
    State(state): State<SharedState>,
    Json(new_alert): Json<NewAlert>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    if new_alert.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    let alert = state.engine.create_alert(new_alert).await;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn summary(State(state): State<SharedState>) -> Json<AlertSummary> {
    Json(state.engine.get_alert_summary().await)
}

pub async fn get_one(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.engine.get_alert(&id).await?))
}

pub async fn acknowledge(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state
        .engine
        .acknowledge_alert(&id, &body.user, body.comment)
        .await?;
    Ok(Json(alert))
}

pub async fn resolve(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<Alert>, ApiError> {
    let alert = state.engine.resolve_alert(&id, &body.user, body.comment).await?;
    Ok(Json(alert))
}

pub async fn comment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> Result<Json<Alert>, ApiError> {
    if body.comment.trim().is_empty() {
        return Err(ApiError::BadRequest("comment must not be empty".into()));
    }
    let alert = state.engine.comment_alert(&id, &body.user, &body.comment).await?;
    Ok(Json(alert))
}
