//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::batch::{ChartError, DocumentError};

/// Error response body: `{"error": message, "code": CODE}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Request-level errors with HTTP status mapping.
///
/// Per-document failures inside a batch never reach this type; they become
/// entry markers in a successful response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file part in the request")]
    NoFile,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Too many files: at most {limit} per request")]
    TooManyFiles { limit: usize },
    #[error("File {filename:?} exceeds the {limit}-byte upload limit")]
    FileTooLarge { filename: String, limit: usize },
    #[error("Request body exceeds the {limit}-byte limit")]
    RequestTooLarge { limit: usize },
    #[error("File {filename:?} has unsupported type {mime}")]
    UnsupportedMediaType { filename: String, mime: String },
    #[error("{0}")]
    UnreadableDocument(DocumentError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "NO_FILE"),
            ApiError::NoSelectedFile => (StatusCode::BAD_REQUEST, "NO_SELECTED_FILE"),
            ApiError::TooManyFiles { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_MANY_FILES"),
            ApiError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            ApiError::RequestTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "REQUEST_TOO_LARGE")
            }
            ApiError::UnsupportedMediaType { .. } => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
            }
            ApiError::UnreadableDocument(DocumentError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT")
            }
            ApiError::UnreadableDocument(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNREADABLE_DOCUMENT")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        if status.is_client_error() {
            tracing::debug!(code, %message, "Request rejected");
        }

        (status, Json(ErrorBody { error: message, code })).into_response()
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Internal(detail) => ApiError::Internal(detail),
            other => ApiError::UnreadableDocument(other),
        }
    }
}

impl From<ChartError> for ApiError {
    fn from(err: ChartError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
