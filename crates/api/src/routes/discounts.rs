//! Discount code admin endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::Money;
use domain::{DiscountCode, DiscountValue};
use serde::{Deserialize, Serialize};
use store::StoreError;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateDiscountRequest {
    pub code: String,
    /// Percentage discount, mutually exclusive with `amount_cents`.
    pub percent: Option<u32>,
    pub cap_cents: Option<i64>,
    /// Fixed discount in cents.
    pub amount_cents: Option<i64>,
    pub usage_limit: u32,
    pub per_user_limit: u32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub min_order_total_cents: i64,
}

#[derive(Serialize)]
pub struct DiscountCreatedResponse {
    pub code_id: String,
    pub code: String,
}

/// POST /discounts — create a usage-counted discount code (admin).
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<DiscountCreatedResponse>), ApiError> {
    let value = match (req.percent, req.amount_cents) {
        (Some(percent), None) => DiscountValue::Percentage {
            percent,
            cap: req.cap_cents.map(Money::from_cents),
        },
        (None, Some(cents)) => DiscountValue::Fixed {
            amount: Money::from_cents(cents),
        },
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of percent or amount_cents is required".to_string(),
            ));
        }
    };

    let code = DiscountCode::new(
        &req.code,
        value,
        req.usage_limit,
        req.per_user_limit,
        req.starts_at,
        req.expires_at,
        Money::from_cents(req.min_order_total_cents),
    )
    .map_err(StoreError::from)?;

    state.discounts.insert_code(&code).await?;

    Ok((
        StatusCode::CREATED,
        Json(DiscountCreatedResponse {
            code_id: code.id().to_string(),
            code: code.code().to_string(),
        }),
    ))
}
