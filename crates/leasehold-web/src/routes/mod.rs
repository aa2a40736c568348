//! REST API routes
//!
//! Demo resources behind the idempotency layer.
//!
//! ## Route Structure
//!
//! - `GET /health` - Health check endpoint
//! - `POST /payments` - Create a payment
//! - `GET /payments` - List payments
//! - `POST /tenants` - Create a tenant
//! - `GET /tenants/{id}` - Fetch a tenant
//! - `PUT /tenants/{id}` - Rename a tenant
//! - `DELETE /tenants/{id}` - Remove a tenant
//! - `POST /webhooks/stripe` - Receive a provider webhook
//!
//! Handlers know nothing about idempotency. Every write reaching them has
//! already been claimed by the coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::RwLock;

pub mod health;
pub mod payments;
pub mod tenants;
pub mod webhooks;

/// Shared state of the demo resources.
#[derive(Clone, Default)]
pub struct AppState {
    pub payments: Arc<RwLock<Vec<payments::Payment>>>,
    pub tenants: Arc<RwLock<HashMap<String, tenants::Tenant>>>,
    pub webhook_deliveries: Arc<AtomicU64>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Create the API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/tenants", post(tenants::create_tenant))
        .route(
            "/tenants/{id}",
            get(tenants::get_tenant)
                .put(tenants::update_tenant)
                .delete(tenants::delete_tenant),
        )
        .route("/webhooks/stripe", post(webhooks::receive_stripe))
}
