use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use lumberyard_core::DomainError;
use lumberyard_infra::store::StoreError;
use lumberyard_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::ProductNotFound(_) => json_error(StatusCode::NOT_FOUND, "product_not_found", message),
        DomainError::OrderNotFound(_) => json_error(StatusCode::NOT_FOUND, "order_not_found", message),
        DomainError::CustomerNotFound(_) => json_error(StatusCode::NOT_FOUND, "customer_not_found", message),
        DomainError::ConfirmationNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "confirmation_not_found", message)
        }
        DomainError::NotificationNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "notification_not_found", message)
        }
        DomainError::ServiceOrderNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "service_order_not_found", message)
        }
        DomainError::InsufficientStock { .. } => json_error(StatusCode::CONFLICT, "insufficient_stock", message),
        DomainError::DuplicateConfirmation(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_confirmation", message)
        }
        DomainError::InvalidTransition { .. } => json_error(StatusCode::CONFLICT, "invalid_transition", message),
        DomainError::InvalidQuantity(_) => json_error(StatusCode::BAD_REQUEST, "invalid_quantity", message),
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path identifier, answering 400 when it is not one.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e: DomainError| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
