//! Building blocks of the idempotent write protocol.
//!
//! - [`hash`]: canonical request hashing
//! - [`key`]: idempotency key extraction and webhook key synthesis
//! - [`client`]: caller identity and client id resolution
//! - [`record`]: records and their claimed/completed lifecycle
//! - [`store`]: the store contract the coordinator is written against
//! - [`memory`]: in-process store implementation

pub mod client;
pub mod hash;
pub mod key;
pub mod memory;
pub mod record;
pub mod store;

pub use client::{CLIENT_ID_CLAIMS, CallerIdentity, ClientId, resolve_client_id};
pub use hash::{RequestHash, body_hash, request_hash};
pub use key::{IdempotencyKey, KeyDeriver, webhook_key};
pub use memory::{InMemoryIdempotencyStore, StoreStats};
pub use record::{CLAIMED_STATUS, IdempotencyRecord, RecordState, StoredResponse};
pub use store::{IdempotencyStore, StoreError};
