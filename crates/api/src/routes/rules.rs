//! Rule Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{ApiError, SharedState};
use alerting::{AlertRule, NewAlertRule};

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

pub async fn list(State(state): State<SharedState>) -> Json<Vec<AlertRule>> {
    Json(state.engine.get_alert_rules().await)
}

pub async fn create(
    State(state): State<SharedState>,
    Json(rule): Json<NewAlertRule>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    let rule = state.engine.add_alert_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Enable or disable a rule
pub async fn toggle(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<AlertRule>, ApiError> {
    Ok(Json(state.engine.toggle_alert_rule(&id, body.enabled).await?))
}

pub async fn remove(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_alert_rule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
