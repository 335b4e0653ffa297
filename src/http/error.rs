//! Mapping of pipeline failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::model::ValidationError;
use crate::storage::StorageError;

/// Failure raised by a handler, converted to a status code at the boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Json(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Validation(_) | ApiError::Json(_) => {
                tracing::debug!(error = %self, "Rejected metric request");
                (status, self.to_string()).into_response()
            }
            ApiError::Storage(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Metric not found");
                (status, "metric not found").into_response()
            }
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage operation failed");
                (status, "internal server error").into_response()
            }
        }
    }
}
