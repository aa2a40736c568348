//! Store contract for idempotency records.
//!
//! The store is the single shared mutable resource behind the coordinator
//! and the only arbiter of concurrent claims. Implementations backed by a
//! database must enforce (`client_id`, `idempotency_key`) uniqueness at
//! commit time and report a lost race as [`StoreError::AlreadyClaimed`];
//! a lookup followed by an insert is not an acceptable claim.
//!
//! # Architecture
//!
//! - `IdempotencyStore`: trait the coordinator is written against
//! - `InMemoryIdempotencyStore`: single-process implementation
//!   (see [`super::memory`])

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use super::client::ClientId;
use super::hash::RequestHash;
use super::key::IdempotencyKey;
use super::record::{IdempotencyRecord, StoredResponse};

/// Store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another request holds or completed this key.
    #[error("idempotency key already claimed: {client_id}/{key}")]
    AlreadyClaimed { client_id: ClientId, key: IdempotencyKey },

    /// Infrastructure failure in the backing store.
    #[error("idempotency store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Persistent key→record table used by the coordinator.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Fetch the record for (`client_id`, `key`), reflecting every write this
    /// process has committed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on infrastructure failure.
    async fn lookup(
        &self,
        client_id: &ClientId,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Atomically create a claimed placeholder for (`client_id`, `key`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyClaimed`] if a record already exists for
    /// the pair, including one created by a concurrent claim.
    async fn claim(
        &self,
        client_id: &ClientId,
        key: &IdempotencyKey,
        hash: &RequestHash,
    ) -> Result<IdempotencyRecord, StoreError>;

    /// Mark a claimed record completed with the captured response.
    ///
    /// Completing a missing or already completed record is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on infrastructure failure.
    async fn complete(&self, id: Ulid, response: StoredResponse) -> Result<(), StoreError>;

    /// Remove a claimed record so its key can be claimed again.
    ///
    /// Never removes a completed record; deleting one is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on infrastructure failure.
    async fn delete(&self, id: Ulid) -> Result<(), StoreError>;

    /// Remove records created more than `ttl` ago.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on infrastructure failure.
    async fn purge_expired(&self, ttl: Duration) -> Result<u64, StoreError>;
}
