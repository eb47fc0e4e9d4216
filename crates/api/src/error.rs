//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, InventoryError, OrderError, PaymentError};
use fulfillment::FulfillmentError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Fulfillment flow error.
    Fulfillment(FulfillmentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    match &err {
        FulfillmentError::OrderNotFound(_)
        | FulfillmentError::PaymentNotFound(_)
        | FulfillmentError::UnknownAuthority(_) => (StatusCode::NOT_FOUND, err.to_string()),
        FulfillmentError::OrderNotReady(_) | FulfillmentError::AlreadyPaid(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        FulfillmentError::Domain(domain_err) => domain_error_to_response(domain_err, &err),
        FulfillmentError::Store(store_err) => store_error_to_response(store_err, &err),
        FulfillmentError::Gateway(_) | FulfillmentError::Notification(_) => {
            tracing::error!(error = %err, "upstream service error");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn domain_error_to_response(err: &DomainError, source: &dyn std::fmt::Display) -> (StatusCode, String) {
    let status = match err {
        DomainError::Order(order_err) => match order_err {
            OrderError::InvalidTransition { .. }
            | OrderError::NotCancellable { .. }
            | OrderError::ReturnWindowClosed { .. } => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        },
        DomainError::Payment(payment_err) => match payment_err {
            PaymentError::AlreadyTerminal { .. } | PaymentError::NotRefundable { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::BAD_REQUEST,
        },
        DomainError::Inventory(InventoryError::InsufficientStock { .. }) => StatusCode::CONFLICT,
        DomainError::Inventory(_) => StatusCode::BAD_REQUEST,
        DomainError::Discount(_) => StatusCode::BAD_REQUEST,
    };
    (status, source.to_string())
}

fn store_error_to_response(err: &StoreError, source: &dyn std::fmt::Display) -> (StatusCode, String) {
    match err {
        StoreError::VersionConflict { .. } => (
            StatusCode::CONFLICT,
            "Concurrent modification, please retry".to_string(),
        ),
        StoreError::DuplicateKey { .. } => (StatusCode::CONFLICT, source.to_string()),
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, source.to_string()),
        StoreError::Domain(domain_err) => domain_error_to_response(domain_err, source),
        StoreError::Database(_) | StoreError::Migration(_) | StoreError::Serialization(_) => {
            tracing::error!(error = %source, "persistence error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Fulfillment(FulfillmentError::Store(err))
    }
}
