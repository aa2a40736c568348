//! Response capture buffer.
//!
//! The downstream response is read fully into memory so that it can be
//! persisted before any byte reaches the caller. A capture is owned by one
//! request and is consumed when flushed.

use axum::{
    body::{Body, Bytes},
    http::{StatusCode, header, response::Parts},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use leasehold_core::idempotency::StoredResponse;

use crate::error::IdempotencyError;

/// A fully buffered downstream response.
#[derive(Debug)]
pub struct CapturedResponse {
    parts: Parts,
    body: Bytes,
}

impl CapturedResponse {
    /// Buffer `response`, failing if its body exceeds `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyError::Capture`] if the body stream fails or is
    /// larger than `limit`.
    pub async fn capture(response: Response, limit: usize) -> Result<Self, IdempotencyError> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| IdempotencyError::Capture {
                reason: e.to_string(),
            })?;
        Ok(Self { parts, body })
    }

    pub const fn status(&self) -> StatusCode {
        self.parts.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The form persisted on completion.
    ///
    /// Raw bytes are always stored. JSON bodies that are valid UTF-8 are
    /// additionally stored as a string for readers that predate the raw form.
    pub fn to_stored(&self) -> StoredResponse {
        let json = self
            .content_type()
            .filter(|ct| is_json(ct))
            .and_then(|_| std::str::from_utf8(&self.body).ok())
            .map(str::to_string);

        StoredResponse {
            status_code: self.status().as_u16(),
            content_type: self.content_type().map(str::to_string),
            body_base64: Some(BASE64.encode(&self.body)),
            json,
        }
    }

    /// Flush the buffered response to the caller unchanged.
    pub fn into_response(self) -> Response {
        Response::from_parts(self.parts, Body::from(self.body))
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
