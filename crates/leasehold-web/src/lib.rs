//! Leasehold Web Server
//!
//! Idempotent write coordination as axum middleware, with tower layers for
//! CORS, tracing, compression and panic recovery.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Method};
use leasehold_core::{IdempotencyConfig, idempotency::IdempotencyStore};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod capture;
pub mod coordinator;
pub mod error;
pub mod middleware;
pub mod replay;
pub mod routes;
pub mod server;

pub use coordinator::{CORRELATION_ID_HEADER, Coordinator, RequestScope};
pub use error::{AppError, ErrorResponse, IdempotencyError};
pub use middleware::{Middleware, apply_middleware, with_idempotency};
pub use replay::REPLAYED_HEADER;
pub use routes::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Allowed CORS origin (e.g., "http://localhost:5173")
    pub cors_origin: String,
    /// How often expired idempotency records are purged
    pub purge_interval: Duration,
    pub idempotency: IdempotencyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
            purge_interval: Duration::from_secs(300),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `LEASEHOLD_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source over the defaults.
    ///
    /// Unparseable numeric values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: lookup("LEASEHOLD_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            cors_origin: lookup("LEASEHOLD_CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            purge_interval: lookup("LEASEHOLD_PURGE_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .map_or(defaults.purge_interval, Duration::from_secs),
            idempotency: IdempotencyConfig::from_lookup(&lookup),
        }
    }
}

/// Create the router with the idempotency layer and tower middleware.
///
/// Layer order from the outside in: tracing, compression, CORS, panic
/// recovery, request logging, identity, idempotency, routes. Compression sits
/// outside idempotency so that captured and replayed bodies are the
/// handler's own bytes.
///
/// # Errors
///
/// Returns an error if the CORS origin is not a valid header value or the
/// idempotency configuration does not validate.
pub fn create_router(
    config: &ServerConfig,
    store: Arc<dyn IdempotencyStore>,
    state: AppState,
) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", config.cors_origin);

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<::axum::http::HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let coordinator = Arc::new(Coordinator::new(store, config.idempotency.clone())?);

    let router = with_idempotency(routes::create_router().with_state(state), coordinator);
    let router = apply_middleware(
        router,
        &[
            Middleware::Identity,
            Middleware::Logging,
            Middleware::CatchPanic,
        ],
    )
    .layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    );

    Ok(router)
}

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] ::axum::http::header::InvalidHeaderValue),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] ::axum::http::Error),

    /// Axum error
    #[error("Axum error: {0}")]
    Axum(#[from] axum::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] leasehold_core::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}
