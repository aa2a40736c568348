//! Caller identity and client id resolution.
//!
//! Authentication happens upstream; by the time a request reaches the
//! coordinator its verified claims are available as a [`CallerIdentity`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Claims consulted for the client id, highest precedence first.
pub const CLIENT_ID_CLAIMS: [&str; 4] = ["client_id", "azp", "sub", "nameid"];

/// Identity namespace for idempotency keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap a raw client id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw client id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verified claims about the caller of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    claims: BTreeMap<String, String>,
}

impl CallerIdentity {
    /// An identity with no claims.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Look up a claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }
}

/// Resolve the client id from the first non-blank claim in
/// [`CLIENT_ID_CLAIMS`] order, else `anonymous`.
#[must_use]
pub fn resolve_client_id(identity: Option<&CallerIdentity>, anonymous: &str) -> ClientId {
    identity
        .and_then(|id| {
            CLIENT_ID_CLAIMS
                .iter()
                .filter_map(|name| id.claim(name))
                .map(str::trim)
                .find(|value| !value.is_empty())
        })
        .map_or_else(|| ClientId::new(anonymous), ClientId::new)
}
