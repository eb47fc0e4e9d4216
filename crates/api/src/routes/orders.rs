//! Checkout and order lifecycle endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{BuyerId, Money, OrderId, ShippingMethodId, VariantId};
use domain::Order;
use fulfillment::{CheckoutItem, CheckoutRequest};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub buyer_id: BuyerId,
    pub items: Vec<OrderItemRequest>,
    pub shipping_method_id: Option<ShippingMethodId>,
    pub shipping_cost_cents: i64,
    pub discount_code: Option<String>,
    pub idempotency_key: String,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor: String,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ShipRequest {
    pub tracking_number: Option<String>,
}

#[derive(Deserialize)]
pub struct ReturnRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub status: String,
    pub reference: String,
    pub items: Vec<OrderItemResponse>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub final_amount_cents: i64,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub variant_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderPlacedResponse {
    pub order_id: String,
    pub status: String,
    pub reference: String,
    pub final_amount_cents: i64,
    pub replayed: bool,
}

fn order_response(order: &Order) -> OrderResponse {
    let items = order
        .items()
        .iter()
        .map(|item| OrderItemResponse {
            variant_id: item.variant_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        })
        .collect();

    OrderResponse {
        id: order.id().to_string(),
        buyer_id: order.buyer_id().to_string(),
        status: order.status().to_string(),
        reference: order.reference().to_string(),
        items,
        subtotal_cents: order.subtotal().cents(),
        discount_cents: order.discount_amount().cents(),
        shipping_cents: order.shipping_cost().cents(),
        final_amount_cents: order.final_amount().cents(),
    }
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

// -- Handlers --

/// POST /orders — place an order: reserve stock, apply the discount,
/// persist. Replayed idempotency keys return the original order with 200.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let items = req
        .items
        .iter()
        .map(|item| CheckoutItem {
            variant_id: item.variant_id,
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
            unit_cost: Money::from_cents(item.unit_cost_cents),
        })
        .collect();

    let placed = state
        .service
        .place_order(CheckoutRequest {
            buyer_id: req.buyer_id,
            items,
            shipping_method_id: req.shipping_method_id.unwrap_or_default(),
            shipping_cost: Money::from_cents(req.shipping_cost_cents),
            discount_code: req.discount_code,
            idempotency_key: req.idempotency_key,
        })
        .await?;

    for item in placed.order.items() {
        state.availability_cache.invalidate(item.variant_id).await;
    }

    let status = if placed.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let response = OrderPlacedResponse {
        order_id: placed.order.id().to_string(),
        status: placed.order.status().to_string(),
        reference: placed.order.reference().to_string(),
        final_amount_cents: placed.order.final_amount().cents(),
        replayed: placed.replayed,
    };

    Ok((status, Json(response)))
}

/// GET /orders/:id — load an order by id.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.load_order(order_id).await?;
    Ok(Json(order_response(&order)))
}

/// POST /orders/:id/cancel — cancel with compensation (release stock,
/// cancel discount usage).
#[tracing::instrument(skip(state, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .service
        .cancel_order(order_id, &req.actor, &req.reason)
        .await?;

    for item in order.items() {
        state.availability_cache.invalidate(item.variant_id).await;
    }

    Ok(Json(order_response(&order)))
}

/// POST /orders/:id/ship — mark a paid order shipped.
#[tracing::instrument(skip(state, req))]
pub async fn ship(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ShipRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.ship_order(order_id, req.tracking_number).await?;
    Ok(Json(order_response(&order)))
}

/// POST /orders/:id/deliver — mark a shipped order delivered.
#[tracing::instrument(skip(state))]
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.deliver_order(order_id).await?;
    Ok(Json(order_response(&order)))
}

/// POST /orders/:id/return — return a delivered order, restoring stock.
#[tracing::instrument(skip(state, req))]
pub async fn return_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ReturnRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.return_order(order_id, &req.reason).await?;

    for item in order.items() {
        state.availability_cache.invalidate(item.variant_id).await;
    }

    Ok(Json(order_response(&order)))
}
