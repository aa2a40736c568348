//! Idempotency records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::client::ClientId;
use super::hash::RequestHash;
use super::key::IdempotencyKey;

/// Status code stored while a record is claimed but not completed.
pub const CLAIMED_STATUS: u16 = 0;

/// Lifecycle phase of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// A request holds the key and its handler has not finished.
    Claimed,
    /// The handler finished and its response is stored for replay.
    Completed,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claimed => write!(f, "claimed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A captured response, as persisted on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status of the captured response. Never [`CLAIMED_STATUS`].
    pub status_code: u16,
    /// `Content-Type` of the captured response, if any.
    pub content_type: Option<String>,
    /// Raw response bytes, base64 encoded.
    pub body_base64: Option<String>,
    /// Response body as a JSON string, for records written without raw bytes.
    pub json: Option<String>,
}

/// One (client, key) entry in the idempotency store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Generated on claim.
    pub id: Ulid,
    pub client_id: ClientId,
    pub idempotency_key: IdempotencyKey,
    /// Fixed at claim time.
    pub request_hash: RequestHash,
    /// [`CLAIMED_STATUS`] until completed.
    pub status_code: u16,
    pub response_content_type: Option<String>,
    pub response_body_base64: Option<String>,
    pub response_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// A fresh placeholder for a just-admitted request.
    #[must_use]
    pub fn claimed(
        client_id: ClientId,
        idempotency_key: IdempotencyKey,
        request_hash: RequestHash,
    ) -> Self {
        Self {
            id: Ulid::new(),
            client_id,
            idempotency_key,
            request_hash,
            status_code: CLAIMED_STATUS,
            response_content_type: None,
            response_body_base64: None,
            response_json: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn state(&self) -> RecordState {
        if self.status_code == CLAIMED_STATUS {
            RecordState::Claimed
        } else {
            RecordState::Completed
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.state(), RecordState::Completed)
    }

    /// Whether a later request carries the same payload as the claimant.
    #[must_use]
    pub fn matches(&self, hash: &RequestHash) -> bool {
        self.request_hash == *hash
    }

    /// Transition to completed with `response`.
    ///
    /// Returns `false` and leaves the record untouched if it is already
    /// completed.
    pub fn complete(&mut self, response: StoredResponse) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status_code = response.status_code;
        self.response_content_type = response.content_type;
        self.response_body_base64 = response.body_base64;
        self.response_json = response.json;
        self.completed_at = Some(Utc::now());
        true
    }

    /// The stored response, if the record is completed.
    #[must_use]
    pub fn response(&self) -> Option<StoredResponse> {
        self.is_completed().then(|| StoredResponse {
            status_code: self.status_code,
            content_type: self.response_content_type.clone(),
            body_base64: self.response_body_base64.clone(),
            json: self.response_json.clone(),
        })
    }
}
