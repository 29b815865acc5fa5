use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use lumberyard_core::ServiceOrderId;
use lumberyard_infra::{ServiceResult, Services};
use lumberyard_lumbering::{LumberingServiceOrder, NewOutput, NewShavings};

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/start", post(start))
        .route("/:id/complete", post(complete))
        .route("/:id/cancel", post(cancel))
        .route("/:id/outputs", post(record_output))
        .route("/:id/shavings", post(record_shavings))
}

fn order_response(result: ServiceResult<LumberingServiceOrder>) -> axum::response::Response {
    match result {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_order(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<dto::CreateServiceOrderRequest>,
) -> axum::response::Response {
    match services.lumbering.create(body.order, body.created_by).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// The order with its outputs and shavings.
pub async fn get_order(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.lumbering.get(order_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn start(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    order_response(services.lumbering.start(order_id).await)
}

pub async fn complete(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    body: Option<Json<dto::CompleteServiceOrderRequest>>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = body.unwrap_or_default();
    order_response(services.lumbering.complete(order_id, body.completed_date).await)
}

pub async fn cancel(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    order_response(services.lumbering.cancel(order_id).await)
}

pub async fn record_output(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    Json(body): Json<NewOutput>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.lumbering.record_output(order_id, body).await {
        Ok((output, order)) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "output": output,
                "service_order": order,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn record_shavings(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    Json(body): Json<NewShavings>,
) -> axum::response::Response {
    let order_id: ServiceOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.lumbering.record_shavings(order_id, body).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
