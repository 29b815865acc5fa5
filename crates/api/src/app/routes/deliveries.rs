use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};

use lumberyard_core::SalesOrderId;
use lumberyard_infra::Services;

use crate::app::errors;

pub fn router() -> Router {
    Router::new()
        .route("/pending", get(list_pending))
        .route("/by-order/:order_id", get(get_by_order))
}

pub async fn list_pending(Extension(services): Extension<Arc<Services>>) -> axum::response::Response {
    match services.deliveries.list_pending().await {
        Ok(deliveries) => (StatusCode::OK, Json(deliveries)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_by_order(
    Extension(services): Extension<Arc<Services>>,
    Path(order_id): Path<String>,
) -> axum::response::Response {
    let order_id: SalesOrderId = match errors::parse_id(&order_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.deliveries.get_by_order(order_id).await {
        Ok(Some(delivery)) => (StatusCode::OK, Json(delivery)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no delivery for this order"),
        Err(e) => errors::service_error_to_response(e),
    }
}
