//! Idempotent write-request coordinator.
//!
//! For every POST, PUT, PATCH and DELETE the coordinator either runs the
//! downstream handler exactly once and records its response, or answers from
//! the store without running it:
//!
//! ```text
//! buffer body -> derive key -> hash -> lookup
//!   none                -> claim -> run handler -> complete -> flush
//!   hash differs        -> 409 reuse with different payload
//!   claimed             -> 409 still in progress
//!   completed           -> replay
//! ```
//!
//! The coordinator holds no locks of its own. Two requests racing for the same
//! (client, key) are separated by the store's atomic claim; the loser re-reads
//! the record and is answered as if it had arrived second.
//!
//! A claimed placeholder is deleted when the handler fails, so the key can be
//! retried. Failure means a 5xx response, a panic, a response that cannot be
//! captured, or the request future being dropped before completion.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, Method},
    response::Response,
};
use futures::FutureExt;
use leasehold_core::{
    IdempotencyConfig,
    idempotency::{
        CallerIdentity, ClientId, IdempotencyKey, IdempotencyRecord, IdempotencyStore,
        KeyDeriver, RecordState, RequestHash, StoreError, request_hash, resolve_client_id,
    },
};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::capture::CapturedResponse;
use crate::error::IdempotencyError;
use crate::replay::replay_response;

/// Header carrying the caller's correlation id.
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Request-scoped values the coordinator needs but does not look up itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub client_id: ClientId,
    pub correlation_id: String,
}

impl RequestScope {
    pub fn new(client_id: ClientId, correlation_id: impl Into<String>) -> Self {
        Self {
            client_id,
            correlation_id: correlation_id.into(),
        }
    }

    /// Resolve the scope from verified identity claims and request headers.
    ///
    /// A missing or blank correlation id header is replaced by a fresh ULID.
    pub fn resolve(
        identity: Option<&CallerIdentity>,
        headers: &HeaderMap,
        anonymous: &str,
    ) -> Self {
        let correlation_id = headers
            .get(&CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(|| Ulid::new().to_string(), str::to_string);

        Self {
            client_id: resolve_client_id(identity, anonymous),
            correlation_id,
        }
    }
}

/// Identifies one request in coordinator log events.
struct LogContext<'a> {
    scope: &'a RequestScope,
    key: &'a IdempotencyKey,
    method: Method,
    path: String,
}

impl LogContext<'_> {
    fn event(&self, event: &'static str, status: u16) {
        info!(
            event,
            correlation_id = %self.scope.correlation_id,
            client_id = %self.scope.client_id,
            key = %self.key,
            method = %self.method,
            path = %self.path,
            status,
            "Idempotency {event}"
        );
    }
}

/// Placeholder ownership for one claimed record.
///
/// Dropping an armed guard releases the claim from a spawned task, which is
/// how a cancelled request frees its key.
struct ClaimGuard {
    store: Arc<dyn IdempotencyStore>,
    id: Option<Ulid>,
}

impl ClaimGuard {
    fn new(store: Arc<dyn IdempotencyStore>, id: Ulid) -> Self {
        Self { store, id: Some(id) }
    }

    /// Keep the record; it is now the responsibility of `complete`.
    fn disarm(&mut self) {
        self.id = None;
    }

    /// Delete the placeholder now. Deletion errors are logged and swallowed.
    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            delete_placeholder(self.store.as_ref(), id).await;
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { delete_placeholder(store.as_ref(), id).await });
            }
            Err(_) => warn!(id = %id, "No runtime to release abandoned idempotency claim"),
        }
    }
}

async fn delete_placeholder(store: &dyn IdempotencyStore, id: Ulid) {
    match store.delete(id).await {
        Ok(()) => debug!(id = %id, "Released idempotency claim"),
        Err(e) => warn!(id = %id, error = %e, "Failed to release idempotency claim"),
    }
}

/// Coordinates idempotent execution of write requests.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn IdempotencyStore>,
    deriver: KeyDeriver,
    config: IdempotencyConfig,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("deriver", &self.deriver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator over `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        config: IdempotencyConfig,
    ) -> leasehold_core::Result<Self> {
        config.validate()?;
        let deriver = KeyDeriver::from_config(&config)?;
        Ok(Self {
            store,
            deriver,
            config,
        })
    }

    pub const fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Whether requests with `method` go through the protocol.
    pub fn intercepts(method: &Method) -> bool {
        matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    /// Run `next` for `request` at most once per (client, key).
    ///
    /// Non-write requests are passed to `next` untouched. A panic in `next`
    /// releases the claim and is then resumed unchanged.
    ///
    /// # Errors
    ///
    /// Returns the protocol's own answers ([`IdempotencyError::MissingKey`],
    /// [`IdempotencyError::PayloadMismatch`], [`IdempotencyError::InProgress`])
    /// and infrastructure failures of the store, body buffering or capture.
    pub async fn handle<F, Fut>(
        &self,
        scope: &RequestScope,
        request: Request,
        next: F,
    ) -> Result<Response, IdempotencyError>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        if !Self::intercepts(request.method()) {
            debug!(method = %request.method(), "Passing through non-write request");
            return Ok(next(request).await);
        }

        let (parts, body) = request.into_parts();
        let bytes = self.buffer_body(body).await?;

        let key = self
            .deriver
            .derive(parts.uri.path(), &parts.headers, &bytes)
            .ok_or_else(|| IdempotencyError::MissingKey {
                header: self.config.key_header.clone(),
            })?;
        let hash = request_hash(&parts.method, &parts.uri, &bytes);

        let log = LogContext {
            scope,
            key: &key,
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
        };
        let request = Request::from_parts(parts, Body::from(bytes));

        if let Some(existing) = self.store.lookup(&scope.client_id, &key).await? {
            return Self::answer_existing(&existing, &hash, &log);
        }

        let record = match self.store.claim(&scope.client_id, &key, &hash).await {
            Ok(record) => record,
            Err(StoreError::AlreadyClaimed { .. }) => {
                debug!(key = %key, "Lost claim race, re-reading record");
                return match self.store.lookup(&scope.client_id, &key).await? {
                    Some(existing) => Self::answer_existing(&existing, &hash, &log),
                    None => {
                        log.event("conflict", IdempotencyError::InProgress.status_code().as_u16());
                        Err(IdempotencyError::InProgress)
                    }
                };
            }
            Err(e) => return Err(e.into()),
        };

        self.execute(record.id, request, next, &log).await
    }

    async fn buffer_body(&self, body: Body) -> Result<axum::body::Bytes, IdempotencyError> {
        let limit = self.config.max_body_bytes;
        axum::body::to_bytes(body, limit).await.map_err(|e| {
            if is_length_limit(&e) {
                IdempotencyError::PayloadTooLarge { limit }
            } else {
                IdempotencyError::Body {
                    reason: e.to_string(),
                }
            }
        })
    }

    fn answer_existing(
        record: &IdempotencyRecord,
        hash: &RequestHash,
        log: &LogContext<'_>,
    ) -> Result<Response, IdempotencyError> {
        if !record.matches(hash) {
            log.event("conflict", IdempotencyError::PayloadMismatch.status_code().as_u16());
            return Err(IdempotencyError::PayloadMismatch);
        }

        match record.state() {
            RecordState::Claimed => {
                log.event("conflict", IdempotencyError::InProgress.status_code().as_u16());
                Err(IdempotencyError::InProgress)
            }
            RecordState::Completed => {
                let response = replay_response(record)?;
                log.event("replay", record.status_code);
                Ok(response)
            }
        }
    }

    async fn execute<F, Fut>(
        &self,
        id: Ulid,
        request: Request,
        next: F,
        log: &LogContext<'_>,
    ) -> Result<Response, IdempotencyError>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        let mut guard = ClaimGuard::new(Arc::clone(&self.store), id);

        let response = match AssertUnwindSafe(next(request)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                guard.release().await;
                std::panic::resume_unwind(panic);
            }
        };

        if response.status().is_server_error() {
            debug!(status = %response.status(), "Handler failed, releasing claim");
            guard.release().await;
            return Ok(response);
        }

        let capture = CapturedResponse::capture(response, self.config.max_response_bytes);
        let captured = match capture.await {
            Ok(captured) => captured,
            Err(e) => {
                guard.release().await;
                return Err(e);
            }
        };

        // The guard stays armed while `complete` is pending so a dropped
        // request still frees the key. Once it returns, even with an error,
        // the record is kept: the handler's effect is real.
        let completed = self.store.complete(id, captured.to_stored()).await;
        guard.disarm();
        completed?;
        log.event("stored", captured.status().as_u16());

        Ok(captured.into_response())
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}
