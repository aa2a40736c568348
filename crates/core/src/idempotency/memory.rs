//! In-memory implementation of the idempotency store.
//!
//! Records live in a `HashMap` behind a `tokio::sync::RwLock`. A claim takes
//! the write lock and inserts through the entry API, so the existence check
//! and the insert are one atomic step. Suitable for a single instance and for
//! tests; multi-instance deployments need a shared database-backed store.

#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use ulid::Ulid;

use super::client::ClientId;
use super::hash::RequestHash;
use super::key::IdempotencyKey;
use super::record::{IdempotencyRecord, RecordState, StoredResponse};
use super::store::{IdempotencyStore, StoreError};

type RecordKey = (ClientId, IdempotencyKey);

#[derive(Debug, Default)]
struct Records {
    by_key: HashMap<RecordKey, IdempotencyRecord>,
    by_id: HashMap<Ulid, RecordKey>,
}

impl Records {
    fn remove(&mut self, id: Ulid) -> Option<IdempotencyRecord> {
        let key = self.by_id.remove(&id)?;
        self.by_key.remove(&key)
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Records currently claimed.
    pub claimed: usize,
    /// Records completed and available for replay.
    pub completed: usize,
}

/// In-memory idempotency store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts records by lifecycle phase.
    pub async fn stats(&self) -> StoreStats {
        let records = self.records.read().await;
        records
            .by_key
            .values()
            .fold(StoreStats::default(), |mut stats, record| {
                match record.state() {
                    RecordState::Claimed => stats.claimed = stats.claimed.saturating_add(1),
                    RecordState::Completed => stats.completed = stats.completed.saturating_add(1),
                }
                stats
            })
    }

    /// Total number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.by_key.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn lookup(
        &self,
        client_id: &ClientId,
        key: &IdempotencyKey,
    ) -> Result<Option<IdempotencyRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .by_key
            .get(&(client_id.clone(), key.clone()))
            .cloned())
    }

    async fn claim(
        &self,
        client_id: &ClientId,
        key: &IdempotencyKey,
        hash: &RequestHash,
    ) -> Result<IdempotencyRecord, StoreError> {
        let mut guard = self.records.write().await;
        let records = &mut *guard;

        match records.by_key.entry((client_id.clone(), key.clone())) {
            Entry::Occupied(_) => Err(StoreError::AlreadyClaimed {
                client_id: client_id.clone(),
                key: key.clone(),
            }),
            Entry::Vacant(slot) => {
                let record =
                    IdempotencyRecord::claimed(client_id.clone(), key.clone(), hash.clone());
                slot.insert(record.clone());
                records
                    .by_id
                    .insert(record.id, (client_id.clone(), key.clone()));
                debug!(
                    id = %record.id,
                    client_id = %client_id,
                    key = %key,
                    "Claimed idempotency key"
                );
                Ok(record)
            }
        }
    }

    async fn complete(&self, id: Ulid, response: StoredResponse) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let Records { by_key, by_id } = &mut *records;

        let Some(record) = by_id.get(&id).and_then(|key| by_key.get_mut(key)) else {
            warn!(id = %id, "Completion for unknown idempotency record ignored");
            return Ok(());
        };

        if !record.complete(response) {
            warn!(id = %id, "Completion for already completed idempotency record ignored");
        }
        Ok(())
    }

    async fn delete(&self, id: Ulid) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        let completed = records
            .by_id
            .get(&id)
            .and_then(|key| records.by_key.get(key))
            .is_some_and(IdempotencyRecord::is_completed);

        if completed {
            debug!(id = %id, "Refusing to delete completed idempotency record");
            return Ok(());
        }

        records.remove(id);
        Ok(())
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<u64, StoreError> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now().checked_sub_signed(ttl);
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let mut records = self.records.write().await;
        let expired: Vec<Ulid> = records
            .by_key
            .values()
            .filter(|record| record.created_at < cutoff)
            .map(|record| record.id)
            .collect();

        let purged = expired
            .into_iter()
            .filter_map(|id| records.remove(id))
            .count();

        Ok(u64::try_from(purged).unwrap_or(u64::MAX))
    }
}
