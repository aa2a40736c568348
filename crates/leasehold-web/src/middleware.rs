//! Middleware for the Leasehold web server.
//!
//! This module provides middleware for:
//! - Request logging with timing
//! - Caller identity extraction from trusted gateway headers
//! - Idempotent write coordination
//! - Panic recovery
//!
//! Request context is extracted before ownership of the request passes to the
//! next layer, and layers are composed with [`apply_middleware`].

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use leasehold_core::idempotency::CallerIdentity;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, RequestScope};

/// Gateway header carrying the verified client id.
pub const CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("x-client-id");

/// Gateway header carrying the verified subject.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Pure request context extracted before passing ownership to next middleware
///
/// Method and Uri are cloned because `next.run()` takes the request by value
/// and the context is still needed once the response comes back.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// HTTP method (GET, POST, etc.)
    pub method: axum::http::Method,
    /// Request URI
    pub uri: axum::http::Uri,
    /// When the request started processing
    pub start: Instant,
}

impl RequestContext {
    fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Log request completion at a level matching the status class
    fn log_completion(&self, status: StatusCode) {
        let duration_ms = self.elapsed().as_millis();
        if status.is_server_error() {
            error!(
                method = %self.method,
                uri = %self.uri,
                duration_ms,
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status.is_client_error() {
            warn!(
                method = %self.method,
                uri = %self.uri,
                duration_ms,
                status = status.as_u16(),
                "Client error occurred"
            );
        } else {
            info!(
                method = %self.method,
                uri = %self.uri,
                duration_ms,
                status = status.as_u16(),
                "Request completed"
            );
        }
    }
}

/// Middleware variants for functional composition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Middleware {
    /// Request logging with timing
    Logging,
    /// Caller identity from gateway headers
    Identity,
    /// Panic recovery into a 500 response
    CatchPanic,
}

/// Request logging middleware
///
/// Logs every request with its status and duration.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_request(&req);

    let response = next.run(req).await;

    ctx.log_completion(response.status());

    response
}

/// Identity middleware
///
/// Authentication happens upstream. This layer trusts the gateway's
/// `X-Client-Id` and `X-User-Id` headers and exposes them to later layers as
/// a [`CallerIdentity`] request extension. Requests without either header get
/// no identity and resolve to the anonymous client.
pub async fn identity_middleware(mut req: Request, next: Next) -> Response {
    if let Some(identity) = identity_from_headers(req.headers()) {
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}

fn identity_from_headers(headers: &HeaderMap) -> Option<CallerIdentity> {
    let claim = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let client_id = claim(&CLIENT_ID_HEADER);
    let user_id = claim(&USER_ID_HEADER);
    if client_id.is_none() && user_id.is_none() {
        return None;
    }

    let identity = client_id
        .into_iter()
        .fold(CallerIdentity::new(), |acc, v| acc.with_claim("client_id", v));
    Some(
        user_id
            .into_iter()
            .fold(identity, |acc, v| acc.with_claim("sub", v)),
    )
}

/// Idempotency middleware
///
/// Routes write requests through the [`Coordinator`]. Protocol answers and
/// infrastructure failures are rendered as problem details.
pub async fn idempotency_middleware(
    State(coordinator): State<Arc<Coordinator>>,
    req: Request,
    next: Next,
) -> Response {
    let scope = RequestScope::resolve(
        req.extensions().get::<CallerIdentity>(),
        req.headers(),
        &coordinator.config().anonymous_client_id,
    );

    match coordinator.handle(&scope, req, |r| next.run(r)).await {
        Ok(response) => response,
        Err(e) => {
            if !e.is_conflict() && e.status_code().is_server_error() {
                error!(
                    correlation_id = %scope.correlation_id,
                    client_id = %scope.client_id,
                    error = %e,
                    "Idempotency coordination failed"
                );
            }
            e.into_response()
        }
    }
}

/// Wrap `router` with the idempotency layer.
///
/// Layers added to `router` after this call run before it, so identity must
/// be applied afterwards for the coordinator to see the caller.
pub fn with_idempotency(router: Router, coordinator: Arc<Coordinator>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        coordinator,
        idempotency_middleware,
    ))
}

/// Functionally compose middleware layers onto a router
///
/// Each entry wraps everything before it, so the last entry is outermost.
///
/// # Example
/// ```rust,ignore
/// let app = Router::new().route("/test", get(handler));
/// let app = apply_middleware(app, &[Middleware::Identity, Middleware::Logging]);
/// ```
pub fn apply_middleware<'a>(
    app: Router,
    middleware: impl IntoIterator<Item = &'a Middleware>,
) -> Router {
    middleware.into_iter().fold(app, |acc, mw| match mw {
        Middleware::Logging => acc.layer(axum::middleware::from_fn(logging_middleware)),
        Middleware::Identity => acc.layer(axum::middleware::from_fn(identity_middleware)),
        Middleware::CatchPanic => acc.layer(CatchPanicLayer::new()),
    })
}
