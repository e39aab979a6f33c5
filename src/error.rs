use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors reported by the storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Structurally invalid filter (e.g. non-positive limit)
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Query filter rejected by the storage engine
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Malformed request payload or parameters
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Requested resource is not retained
    #[error("Not found: {0}")]
    NotFound(String),
    /// Internal server error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Storage(StorageError::InvalidFilter(_)) => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Storage(StorageError::InvalidFilter(_)) => "invalid_filter",
        AppError::BadRequest(_) => "bad_request",
        AppError::NotFound(_) => "not_found",
        AppError::InternalError(_) => "internal_error",
    }
}
