//! Leasehold core: idempotency records, the store contract, request hashing
//! and idempotency key derivation.
//!
//! Nothing in this crate depends on a web framework; the HTTP coordinator in
//! `leasehold-web` is built on top of these types.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod idempotency;
pub mod result;

pub use config::IdempotencyConfig;
pub use error::Error;
pub use result::{Result, ResultExt};
