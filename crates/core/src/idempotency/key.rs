//! Idempotency key extraction and webhook key synthesis.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};

use super::hash::body_hash;
use crate::config::IdempotencyConfig;
use crate::error::Error;
use crate::result::Result;

/// A non-blank token identifying one logical client intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Trim `raw` and reject it if nothing remains.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The key as sent or derived.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the key for a webhook delivery.
///
/// Pure in `(provider, signature, body)`: a provider redelivering the same
/// signed payload always lands on the same key.
#[must_use]
pub fn webhook_key(provider: &str, signature: &str, body: &[u8]) -> IdempotencyKey {
    IdempotencyKey(format!("{provider}:{signature}:{}", body_hash(body)))
}

/// Resolves the idempotency key of an inbound request.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    key_header: HeaderName,
    signature_header: HeaderName,
    webhook_prefix: String,
    webhook_provider: String,
}

impl KeyDeriver {
    /// Build a deriver from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a configured header name is invalid.
    pub fn from_config(config: &IdempotencyConfig) -> Result<Self> {
        let key_header = HeaderName::from_bytes(config.key_header.as_bytes())
            .map_err(|e| Error::invalid_config(format!("key_header: {e}")))?;
        let signature_header = HeaderName::from_bytes(config.signature_header.as_bytes())
            .map_err(|e| Error::invalid_config(format!("signature_header: {e}")))?;

        Ok(Self {
            key_header,
            signature_header,
            webhook_prefix: config.webhook_prefix.trim_end_matches('/').to_string(),
            webhook_provider: config.webhook_provider.clone(),
        })
    }

    /// Whether `path` lies under the webhook prefix.
    ///
    /// Matching is by whole path segments and ignores ASCII case, so
    /// `/Webhooks/Stripe/events` matches `/webhooks/stripe` but
    /// `/webhooks/stripeX` does not.
    #[must_use]
    pub fn is_webhook_path(&self, path: &str) -> bool {
        let prefix = self.webhook_prefix.as_str();
        if prefix.is_empty() {
            return false;
        }
        let Some(head) = path.get(..prefix.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            return false;
        }
        path.get(prefix.len()..)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Derive the key for a request, or `None` if it cannot be derived.
    ///
    /// Outside the webhook prefix the key header is read and trimmed; blank
    /// counts as absent. Under the prefix the key is synthesized from the
    /// provider signature and the body, and a missing signature yields `None`.
    #[must_use]
    pub fn derive(&self, path: &str, headers: &HeaderMap, body: &[u8]) -> Option<IdempotencyKey> {
        if self.is_webhook_path(path) {
            let signature = header_str(headers, &self.signature_header)?;
            return Some(webhook_key(&self.webhook_provider, signature, body));
        }

        header_str(headers, &self.key_header).and_then(IdempotencyKey::parse)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use http::HeaderValue;

    fn deriver() -> KeyDeriver {
        KeyDeriver::from_config(&IdempotencyConfig::default()).unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_parse_trims_and_rejects_blank() {
        assert_eq!(IdempotencyKey::parse("  abc123 ").unwrap().as_str(), "abc123");
        assert!(IdempotencyKey::parse("   ").is_none());
        assert!(IdempotencyKey::parse("").is_none());
    }

    #[test]
    fn test_derive_from_header() {
        let key = deriver().derive(
            "/payments",
            &headers(&[("idempotency-key", " abc123 ")]),
            b"{}",
        );
        assert_eq!(key.unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_derive_missing_or_blank_header() {
        assert!(deriver().derive("/payments", &HeaderMap::new(), b"{}").is_none());
        assert!(
            deriver()
                .derive("/payments", &headers(&[("idempotency-key", "  ")]), b"{}")
                .is_none()
        );
    }

    #[test]
    fn test_webhook_path_uses_signature_not_header() {
        let map = headers(&[("stripe-signature", "t=1,v1=abc"), ("idempotency-key", "ignored")]);
        let key = deriver().derive("/webhooks/stripe", &map, b"payload").unwrap();
        assert_eq!(
            key.as_str(),
            format!("stripe:t=1,v1=abc:{}", body_hash(b"payload"))
        );
    }

    #[test]
    fn test_webhook_path_without_signature_has_no_key() {
        let map = headers(&[("idempotency-key", "present-but-irrelevant")]);
        assert!(deriver().derive("/webhooks/stripe/events", &map, b"x").is_none());
    }

    #[test]
    fn test_webhook_key_is_pure() {
        assert_eq!(webhook_key("stripe", "sig", b"body"), webhook_key("stripe", "sig", b"body"));
        assert_ne!(webhook_key("stripe", "sig", b"body"), webhook_key("stripe", "sig", b"other"));
        assert_ne!(webhook_key("stripe", "sig", b"body"), webhook_key("stripe", "sig2", b"body"));
    }

    #[test]
    fn test_is_webhook_path_segment_matching() {
        let d = deriver();
        assert!(d.is_webhook_path("/webhooks/stripe"));
        assert!(d.is_webhook_path("/WEBHOOKS/Stripe/events"));
        assert!(!d.is_webhook_path("/webhooks/stripex"));
        assert!(!d.is_webhook_path("/webhooks"));
        assert!(!d.is_webhook_path("/payments"));
    }
}
