use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use lumberyard_core::SalesOrderId;
use lumberyard_infra::services::NewSalesOrder;
use lumberyard_infra::Services;

use crate::app::errors;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/:id", get(get_order))
        .route("/by-number/:order_number", get(get_order_by_number))
}

/// Create an order and take its lines out of stock in one unit of work.
pub async fn create_order(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<NewSalesOrder>,
) -> axum::response::Response {
    match services.sales.create_sales_order(body).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: SalesOrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.sales.get_sales_order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order_by_number(
    Extension(services): Extension<Arc<Services>>,
    Path(order_number): Path<String>,
) -> axum::response::Response {
    match services.sales.find_by_order_number(&order_number).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "order_not_found", "sales order not found"),
        Err(e) => errors::service_error_to_response(e),
    }
}
