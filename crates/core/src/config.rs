//! Configuration for the idempotency coordinator.

use std::path::Path;
use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Configuration for idempotent write handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// Header carrying the caller-supplied idempotency key.
    #[serde(default = "default_key_header")]
    pub key_header: String,

    /// Path prefix under which keys are derived from the provider signature.
    #[serde(default = "default_webhook_prefix")]
    pub webhook_prefix: String,

    /// Provider name embedded in derived webhook keys.
    #[serde(default = "default_webhook_provider")]
    pub webhook_provider: String,

    /// Header carrying the provider signature on webhook deliveries.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Upper bound on a buffered request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Upper bound on a captured response body.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Age after which records are purged from the store.
    #[serde(with = "duration_secs", default = "default_record_ttl")]
    pub record_ttl: Duration,

    /// Client id used when the caller carries no identity claims.
    #[serde(default = "default_anonymous_client_id")]
    pub anonymous_client_id: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            key_header: default_key_header(),
            webhook_prefix: default_webhook_prefix(),
            webhook_provider: default_webhook_provider(),
            signature_header: default_signature_header(),
            max_body_bytes: default_max_body_bytes(),
            max_response_bytes: default_max_response_bytes(),
            record_ttl: default_record_ttl(),
            anonymous_client_id: default_anonymous_client_id(),
        }
    }
}

impl IdempotencyConfig {
    /// Set the webhook path prefix.
    #[must_use]
    pub fn webhook_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.webhook_prefix = prefix.into();
        self
    }

    /// Set the request body cap.
    #[must_use]
    pub const fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Set the captured response cap.
    #[must_use]
    pub const fn max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    /// Set the record time-to-live.
    #[must_use]
    pub const fn record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Check that header names parse and limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        parse_header_name("key_header", &self.key_header)?;
        parse_header_name("signature_header", &self.signature_header)?;

        if !self.webhook_prefix.starts_with('/') {
            return Err(Error::invalid_config(format!(
                "webhook_prefix must start with '/': {}",
                self.webhook_prefix
            )));
        }
        if self.webhook_provider.trim().is_empty() {
            return Err(Error::invalid_config("webhook_provider cannot be empty"));
        }
        if self.max_body_bytes == 0 || self.max_response_bytes == 0 {
            return Err(Error::invalid_config("body limits must be non-zero"));
        }
        if self.anonymous_client_id.trim().is_empty() {
            return Err(Error::invalid_config("anonymous_client_id cannot be empty"));
        }
        Ok(())
    }

    /// Load configuration from `LEASEHOLD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Unparseable numeric values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(header) = lookup("LEASEHOLD_IDEMPOTENCY_HEADER") {
            config.key_header = header;
        }
        if let Some(prefix) = lookup("LEASEHOLD_WEBHOOK_PREFIX") {
            config.webhook_prefix = prefix;
        }
        if let Some(provider) = lookup("LEASEHOLD_WEBHOOK_PROVIDER") {
            config.webhook_provider = provider;
        }
        if let Some(header) = lookup("LEASEHOLD_SIGNATURE_HEADER") {
            config.signature_header = header;
        }
        if let Some(limit) = lookup("LEASEHOLD_MAX_BODY_BYTES").and_then(|v| v.parse().ok()) {
            config.max_body_bytes = limit;
        }
        if let Some(limit) = lookup("LEASEHOLD_MAX_RESPONSE_BYTES").and_then(|v| v.parse().ok()) {
            config.max_response_bytes = limit;
        }
        if let Some(secs) = lookup("LEASEHOLD_RECORD_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.record_ttl = Duration::from_secs(secs);
        }

        config
    }

    /// Load configuration from a TOML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or fails
    /// [`IdempotencyConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_read_failed(path, e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_header_name(field: &str, value: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(value.as_bytes())
        .map_err(|e| Error::invalid_config(format!("{field} is not a valid header name: {e}")))
}

fn default_key_header() -> String {
    "Idempotency-Key".to_string()
}

fn default_webhook_prefix() -> String {
    "/webhooks/stripe".to_string()
}

fn default_webhook_provider() -> String {
    "stripe".to_string()
}

fn default_signature_header() -> String {
    "Stripe-Signature".to_string()
}

const fn default_max_body_bytes() -> usize {
    1_048_576
}

const fn default_max_response_bytes() -> usize {
    4_194_304
}

const fn default_record_ttl() -> Duration {
    Duration::from_secs(86_400)
}

fn default_anonymous_client_id() -> String {
    "anonymous".to_string()
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
