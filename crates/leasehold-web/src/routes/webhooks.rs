//! Webhook endpoint: POST /webhooks/stripe
//!
//! Provider retries of the same delivery carry the same signature and body,
//! which is what the idempotency layer keys them on.

use std::sync::atomic::Ordering;

use axum::{body::Bytes, extract::State, response::Json};
use serde::Serialize;
use tracing::debug;

use super::AppState;

/// Acknowledgement returned to the provider
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    received: bool,
    delivery: u64,
}

/// POST /webhooks/stripe - Receive a webhook delivery
pub async fn receive_stripe(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    let delivery = state
        .webhook_deliveries
        .fetch_add(1, Ordering::SeqCst)
        .saturating_add(1);
    debug!(delivery, bytes = body.len(), "Processed webhook delivery");

    Json(WebhookAck {
        received: true,
        delivery,
    })
}
