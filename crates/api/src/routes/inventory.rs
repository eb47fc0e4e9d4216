//! Inventory availability and admin endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::VariantId;
use domain::{Availability, StockLevel};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PutLevelRequest {
    pub on_hand: i64,
    #[serde(default)]
    pub unlimited: bool,
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub variant_id: String,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub in_stock: bool,
    pub unlimited: bool,
}

fn availability_response(variant_id: VariantId, a: Availability) -> AvailabilityResponse {
    AvailabilityResponse {
        variant_id: variant_id.to_string(),
        on_hand: a.on_hand,
        reserved: a.reserved,
        available: a.available,
        in_stock: a.in_stock,
        unlimited: a.unlimited,
    }
}

fn parse_variant_id(raw: &str) -> Result<VariantId, ApiError> {
    VariantId::from_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid variant id: {e}")))
}

/// GET /inventory/:variant_id — availability snapshot, served through a
/// short TTL cache. Checkout never reads through here.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let variant_id = parse_variant_id(&variant_id)?;

    if let Some(cached) = state.availability_cache.get(variant_id).await {
        return Ok(Json(availability_response(variant_id, cached)));
    }

    let availability = state
        .inventory
        .availability(variant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Variant {variant_id} not found")))?;
    state.availability_cache.put(variant_id, availability).await;

    Ok(Json(availability_response(variant_id, availability)))
}

/// PUT /inventory/:variant_id — create or replace a variant's stock
/// counters (admin, seeding).
#[tracing::instrument(skip(state, req))]
pub async fn put_level(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(req): Json<PutLevelRequest>,
) -> Result<StatusCode, ApiError> {
    let variant_id = parse_variant_id(&variant_id)?;

    let level = if req.unlimited {
        StockLevel::unlimited(variant_id)
    } else {
        StockLevel::new(variant_id, req.on_hand)
    };
    state.inventory.put_level(level).await?;
    state.availability_cache.invalidate(variant_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /inventory/:variant_id/adjust — logged admin stock correction.
#[tracing::instrument(skip(state, req))]
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let variant_id = parse_variant_id(&variant_id)?;

    state.inventory.adjust(variant_id, req.delta).await?;
    state.availability_cache.invalidate(variant_id).await;

    let availability = state
        .inventory
        .availability(variant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Variant {variant_id} not found")))?;

    Ok(Json(availability_response(variant_id, availability)))
}
