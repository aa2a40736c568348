//! Rebuilding a response from a completed idempotency record.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use leasehold_core::idempotency::IdempotencyRecord;

use crate::error::IdempotencyError;

/// Marks responses served from the store rather than the handler.
pub const REPLAYED_HEADER: HeaderName = HeaderName::from_static("idempotent-replayed");

/// Content type forced on replays of the legacy JSON-string form.
const JSON_CONTENT_TYPE: &str = "application/json";

/// Build the replay of a completed record.
///
/// The stored raw bytes win over the stored JSON string. The JSON string is
/// only used when no raw bytes were stored, and is always served as JSON.
///
/// # Errors
///
/// Returns [`IdempotencyError::CorruptRecord`] if the status, content type or
/// encoded body stored in the record cannot be used.
pub fn replay_response(record: &IdempotencyRecord) -> Result<Response, IdempotencyError> {
    let status = StatusCode::from_u16(record.status_code).map_err(|e| corrupt(&e))?;

    let stored_type = record
        .response_content_type
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .map_err(|e| corrupt(&e))?;

    let (content_type, body) = match (&record.response_body_base64, &record.response_json) {
        (Some(encoded), _) => {
            let bytes = BASE64.decode(encoded).map_err(|e| corrupt(&e))?;
            (stored_type, Body::from(bytes))
        }
        (None, Some(json)) => (
            Some(HeaderValue::from_static(JSON_CONTENT_TYPE)),
            Body::from(json.clone()),
        ),
        (None, None) => (stored_type, Body::empty()),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
        .headers_mut()
        .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));

    Ok(response)
}

fn corrupt(err: &dyn std::fmt::Display) -> IdempotencyError {
    IdempotencyError::CorruptRecord {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use http_body_util::BodyExt;
    use leasehold_core::idempotency::{ClientId, IdempotencyKey, RequestHash, StoredResponse};

    fn completed(response: StoredResponse) -> IdempotencyRecord {
        let mut record = IdempotencyRecord::claimed(
            ClientId::new("client-a"),
            IdempotencyKey::parse("abc123").unwrap(),
            RequestHash::from_hex("00"),
        );
        assert!(record.complete(response));
        record
    }

    async fn parts(response: Response) -> (StatusCode, Option<String>, Vec<u8>) {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_replay_prefers_raw_bytes() {
        let record = completed(StoredResponse {
            status_code: 201,
            content_type: Some("text/plain".to_string()),
            body_base64: Some(BASE64.encode("raw")),
            json: Some(r#""json""#.to_string()),
        });
        let response = replay_response(&record).unwrap();
        assert_eq!(response.headers().get(REPLAYED_HEADER).unwrap(), "true");

        let (status, content_type, body) = parts(response).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(content_type.as_deref(), Some("text/plain"));
        assert_eq!(body, b"raw");
    }

    #[tokio::test]
    async fn test_replay_json_fallback_forces_json_type() {
        let record = completed(StoredResponse {
            status_code: 200,
            content_type: Some("text/plain".to_string()),
            body_base64: None,
            json: Some(r#"{"id":"p1"}"#.to_string()),
        });

        let (status, content_type, body) = parts(replay_response(&record).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(body, br#"{"id":"p1"}"#);
    }

    #[tokio::test]
    async fn test_replay_empty_body() {
        let record = completed(StoredResponse {
            status_code: 204,
            content_type: None,
            body_base64: None,
            json: None,
        });

        let (status, content_type, body) = parts(replay_response(&record).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(content_type.is_none());
        assert!(body.is_empty());
    }

    #[test]
    fn test_replay_rejects_bad_base64() {
        let record = completed(StoredResponse {
            status_code: 201,
            content_type: None,
            body_base64: Some("!!not base64!!".to_string()),
            json: None,
        });
        assert!(matches!(
            replay_response(&record),
            Err(IdempotencyError::CorruptRecord { .. })
        ));
    }
}
