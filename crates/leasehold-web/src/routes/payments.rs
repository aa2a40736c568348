//! Payment endpoints: POST /payments, GET /payments

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{AppError, Result};

/// Request payload for creating a payment
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    currency: Option<String>,
}

/// A recorded payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub amount: u64,
    pub currency: String,
}

/// POST /payments - Create a payment
///
/// Ids are sequential (`p1`, `p2`, ...), so a duplicated execution is
/// visible as a skipped id.
pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse> {
    let amount = validate_amount(req.amount)?;
    let currency = req.currency.unwrap_or_else(|| "usd".to_string());

    let mut payments = state.payments.write().await;
    let payment = Payment {
        id: format!("p{}", payments.len().saturating_add(1)),
        amount,
        currency,
    };
    payments.push(payment.clone());

    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /payments - List payments
pub async fn list_payments(State(state): State<AppState>) -> Json<Vec<Payment>> {
    Json(state.payments.read().await.clone())
}

fn validate_amount(amount: Option<u64>) -> Result<u64> {
    match amount {
        None => Err(AppError::BadRequest(
            "Missing required field: amount".to_string(),
        )),
        Some(0) => Err(AppError::BadRequest("amount must be positive".to_string())),
        Some(amount) => Ok(amount),
    }
}
