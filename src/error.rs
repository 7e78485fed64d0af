use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of a single record-store operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The token already maps to a live record.
    #[error("short id is already taken")]
    Conflict,

    #[error("no record for short id")]
    NotFound,
}

/// Client-visible outcome of a failed registry operation.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Shortened URL not found.")]
    NotFound,

    /// The token existed but its record expired and has been purged.
    #[error("Shortened URL has expired.")]
    Gone,

    /// Never returned verbatim; the detail is logged and the client gets a
    /// generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Gone => StatusCode::GONE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            // Conflicts are retried by the registry; one escaping is a bug.
            StoreError::Conflict => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal error".to_owned()
            }
            other => other.to_string(),
        };

        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
