//! Payment initiation, gateway callback, and refund endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, PaymentId};
use domain::PaymentTransaction;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::parse_order_id;

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub authority: String,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub amount_cents: Option<i64>,
    pub actor: String,
    pub reason: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub order_id: String,
    pub status: String,
    pub authority: String,
    pub amount_cents: i64,
    pub refunded_cents: Option<i64>,
}

fn payment_response(transaction: &PaymentTransaction) -> PaymentResponse {
    PaymentResponse {
        payment_id: transaction.id().to_string(),
        order_id: transaction.order_id().to_string(),
        status: transaction.status().to_string(),
        authority: transaction.authority().to_string(),
        amount_cents: transaction.amount().cents(),
        refunded_cents: transaction.refunded_amount().map(|m| m.cents()),
    }
}

/// POST /orders/:id/payment — start a gateway charge for a pending order.
#[tracing::instrument(skip(state))]
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let transaction = state.service.initiate_payment(order_id).await?;
    Ok((StatusCode::CREATED, Json(payment_response(&transaction))))
}

/// POST /payments/callback — gateway webhook. Idempotent: redelivery of a
/// terminal transaction returns its current state with 200. Inventory
/// commit lag is invisible here; the reconciliation sweeps close the gap.
#[tracing::instrument(skip(state, req))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let transaction = state.service.handle_callback(&req.authority).await?;

    for item_variant in state
        .service
        .load_order(transaction.order_id())
        .await
        .map(|o| o.items().iter().map(|i| i.variant_id).collect::<Vec<_>>())
        .unwrap_or_default()
    {
        state.availability_cache.invalidate(item_variant).await;
    }

    Ok(Json(payment_response(&transaction)))
}

/// POST /payments/:id/refund — admin refund, full or partial.
#[tracing::instrument(skip(state, req))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id = PaymentId::from_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid payment id: {e}")))?;

    let transaction = state
        .service
        .refund(
            payment_id,
            req.amount_cents.map(Money::from_cents),
            &req.actor,
            &req.reason,
        )
        .await?;

    Ok(Json(payment_response(&transaction)))
}
