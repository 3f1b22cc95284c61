//! Request-level error taxonomy and its mapping to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

// ---

#[derive(Error, Debug)]
pub enum AppError {
    /// Rejected input; nothing was persisted.
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => AppError::NotFound(what),
            StorageError::Database(msg) => AppError::Internal(msg),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (kind, message) = match &self {
            AppError::Validation(_) => ("validation_error", self.to_string()),
            AppError::NotFound(_) => ("not_found", self.to_string()),
            AppError::Internal(detail) => {
                error!("Internal error: {}", detail);
                ("internal_error", "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Parse an optional `upload_id` parameter; empty strings count as absent.
pub fn parse_upload_id(raw: Option<&str>) -> Result<Option<i64>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("invalid upload_id: {s}"))),
    }
}
