use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use lumberyard_core::{ConfirmationId, SalesOrderId};
use lumberyard_infra::services::NewConfirmation;
use lumberyard_infra::{ServiceResult, Services};
use lumberyard_sales::ConfirmationSnapshot;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_confirmation))
        .route("/ready-all", post(mark_all_ready))
        .route("/by-order/:order_id", get(get_by_order))
        .route("/:id", get(get_confirmation))
        .route("/:id/confirm", post(confirm))
        .route("/:id/ready", post(mark_ready))
        .route("/:id/payment-complete", post(mark_payment_complete))
        .route("/:id/picked-up", post(mark_picked_up))
        .route("/:id/cancel", post(cancel))
}

fn snapshot_response(status: StatusCode, result: ServiceResult<ConfirmationSnapshot>) -> axum::response::Response {
    match result {
        Ok(snapshot) => (status, Json(snapshot)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_confirmation(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<NewConfirmation>,
) -> axum::response::Response {
    snapshot_response(StatusCode::CREATED, services.confirmations.create(body).await)
}

pub async fn get_confirmation(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    snapshot_response(StatusCode::OK, services.confirmations.get(confirmation_id).await)
}

pub async fn get_by_order(
    Extension(services): Extension<Arc<Services>>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let order_id: SalesOrderId = match errors::parse_id(&order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    snapshot_response(StatusCode::OK, services.confirmations.get_by_order(order_id).await)
}

pub async fn confirm(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    body: Option<Json<dto::ConfirmRequest>>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = body.unwrap_or_default();
    snapshot_response(
        StatusCode::OK,
        services
            .confirmations
            .confirm(confirmation_id, body.estimated_pickup_date)
            .await,
    )
}

pub async fn mark_ready(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    snapshot_response(
        StatusCode::OK,
        services.confirmations.mark_ready_for_pickup(confirmation_id).await,
    )
}

pub async fn mark_payment_complete(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    snapshot_response(
        StatusCode::OK,
        services.confirmations.mark_payment_complete(confirmation_id).await,
    )
}

pub async fn mark_picked_up(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    body: Option<Json<dto::PickedUpRequest>>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = body.unwrap_or_default();
    snapshot_response(
        StatusCode::OK,
        services
            .confirmations
            .mark_picked_up(confirmation_id, body.actual_pickup_date)
            .await,
    )
}

pub async fn cancel(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelRequest>>,
) -> axum::response::Response {
    let confirmation_id: ConfirmationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = body.unwrap_or_default();
    snapshot_response(
        StatusCode::OK,
        services.confirmations.cancel(confirmation_id, body.reason).await,
    )
}

/// Batch action: move every created/confirmed confirmation to ready.
pub async fn mark_all_ready(Extension(services): Extension<Arc<Services>>) -> axum::response::Response {
    match services.confirmations.mark_all_pending_ready().await {
        Ok(updated) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "updated": updated.len(),
                "confirmations": updated,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
