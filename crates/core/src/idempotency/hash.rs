//! Canonical SHA-256 hashing of a write request's identity.
//!
//! The digest covers `"<METHOD> <PATH><QUERYSTRING>"` followed by the raw
//! body bytes. Both parts are fed to one streaming hasher, so the body is
//! never copied into a combined buffer.

use http::{Method, Uri};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest identifying a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHash(String);

impl RequestHash {
    /// Wrap an already computed hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a request's method, path, query and body.
///
/// The query string, when present, is included with its leading `?`.
#[must_use]
pub fn request_hash(method: &Method, uri: &Uri, body: &[u8]) -> RequestHash {
    let prefix = match uri.query() {
        Some(query) => format!("{} {}?{}", method.as_str(), uri.path(), query),
        None => format!("{} {}", method.as_str(), uri.path()),
    };

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(body);
    RequestHash(hex::encode(hasher.finalize()))
}

/// Hash raw body bytes.
#[inline]
#[must_use]
pub fn body_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
