//! API errors and their HTTP mapping

use alerting::AlertingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by handlers and the server
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Alerting(#[from] AlertingError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Alerting(AlertingError::AlertNotFound(_))
            | ApiError::Alerting(AlertingError::RuleNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Alerting(AlertingError::InvalidRule(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Alerting(AlertingError::History(_)) | ApiError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
