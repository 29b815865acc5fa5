use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use lumberyard_core::CustomerId;
use lumberyard_infra::Services;
use lumberyard_sales::NewCustomer;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_customer))
        .route("/walk-in", post(walk_in_customer))
        .route("/:id", get(get_customer))
        .route("/:id/notifications", get(list_notifications))
        .route("/:id/notifications/unread-count", get(unread_count))
        .route("/:id/notifications/read-all", post(mark_all_read))
        .route("/:id/pending-pickups", get(pending_pickups))
}

pub async fn create_customer(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<NewCustomer>,
) -> axum::response::Response {
    match services.sales.create_customer(body).await {
        Ok(customer) => (StatusCode::CREATED, Json(customer)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn walk_in_customer(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<dto::WalkInRequest>,
) -> axum::response::Response {
    match services.sales.walk_in_customer(&body.name).await {
        Ok(customer) => (StatusCode::CREATED, Json(customer)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_customer(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id: CustomerId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.sales.get_customer(customer_id).await {
        Ok(customer) => (StatusCode::OK, Json(customer)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
    Query(query): Query<dto::NotificationListQuery>,
) -> axum::response::Response {
    let customer_id: CustomerId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .notifications
        .list_recent(customer_id, query.limit, query.unread_only)
        .await
    {
        Ok(notifications) => (StatusCode::OK, Json(notifications)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn unread_count(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id: CustomerId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.notifications.unread_count(customer_id).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "unread_count": count }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_all_read(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id: CustomerId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.notifications.mark_all_as_read(customer_id).await {
        Ok(marked) => (StatusCode::OK, Json(serde_json::json!({ "marked": marked }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn pending_pickups(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let customer_id: CustomerId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.confirmations.pending_pickups(customer_id).await {
        Ok(confirmations) => (StatusCode::OK, Json(confirmations)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
