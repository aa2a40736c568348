//! Error handling with RFC 7807 Problem Details for JSON responses

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use leasehold_core::idempotency::StoreError;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, AppError>;

/// Media type of problem details bodies.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Application error type for route handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failures surfaced by the idempotency coordinator.
///
/// The first three variants are the protocol's own answers (400 and the two
/// 409s). The rest are infrastructure failures for the current request.
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    /// No key could be derived for a write request.
    #[error("{header} header is required")]
    MissingKey { header: String },

    /// The key was already used with a different request hash.
    #[error("Idempotency-Key reuse with different payload.")]
    PayloadMismatch,

    /// The key is claimed by a request that has not completed.
    #[error("Idempotency-Key request is still in progress.")]
    InProgress,

    /// The request body exceeded the buffering limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The request body stream failed.
    #[error("Failed to read request body: {reason}")]
    Body { reason: String },

    /// The downstream response could not be buffered.
    #[error("Failed to capture response: {reason}")]
    Capture { reason: String },

    /// A completed record could not be turned back into a response.
    #[error("Stored response is unreadable: {reason}")]
    CorruptRecord { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IdempotencyError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingKey { .. } | Self::Body { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadMismatch | Self::InProgress => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Capture { .. } | Self::CorruptRecord { .. } | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Problem details title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingKey { .. } => "Validation Error",
            Self::PayloadMismatch | Self::InProgress => "Idempotency conflict",
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("Error"),
        }
    }

    /// Whether this is one of the two 409 answers.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::PayloadMismatch | Self::InProgress)
    }
}

/// RFC 7807 Problem Details for HTTP APIs
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: None,
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
        }
    }

    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let title = status.canonical_reason().unwrap_or("Error");

        Self::new(status, title, err.to_string())
    }

    fn into_problem_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, PROBLEM_JSON)], Json(self)).into_response()
    }
}

impl From<&IdempotencyError> for ErrorResponse {
    fn from(err: &IdempotencyError) -> Self {
        Self::new(err.status_code(), err.title(), err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ErrorResponse::from_error(&self).into_problem_response()
    }
}

impl IntoResponse for IdempotencyError {
    fn into_response(self) -> Response {
        ErrorResponse::from(&self).into_problem_response()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use super::*;
    use http_body_util::BodyExt;

    async fn problem(response: Response) -> (StatusCode, String, serde_json::Value) {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_key_problem() {
        let err = IdempotencyError::MissingKey {
            header: "Idempotency-Key".to_string(),
        };
        let (status, content_type, body) = problem(err.into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(content_type, PROBLEM_JSON);
        assert_eq!(body["title"], "Validation Error");
        assert_eq!(body["status"], 400);
        assert_eq!(body["detail"], "Idempotency-Key header is required");
        assert!(body.get("type").is_none());
    }

    #[tokio::test]
    async fn test_conflict_problems() {
        let (status, _, body) = problem(IdempotencyError::PayloadMismatch.into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["title"], "Idempotency conflict");
        assert_eq!(body["detail"], "Idempotency-Key reuse with different payload.");

        let (status, _, body) = problem(IdempotencyError::InProgress.into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["detail"], "Idempotency-Key request is still in progress.");
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let err = IdempotencyError::from(StoreError::unavailable("connection reset"));
        assert!(!err.is_conflict());
        let (status, _, body) = problem(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["title"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_app_error_problem() {
        let (status, _, body) =
            problem(AppError::NotFound("tenant t-1".to_string()).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["title"], "Not Found");
        assert_eq!(body["detail"], "Not found: tenant t-1");
    }

    #[test]
    fn test_payload_too_large_status() {
        let err = IdempotencyError::PayloadTooLarge { limit: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.title(), "Payload Too Large");
    }
}
