use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};

use lumberyard_core::NotificationId;
use lumberyard_infra::Services;

use crate::app::errors;

pub fn router() -> Router {
    Router::new().route("/:id/read", post(mark_as_read))
}

pub async fn mark_as_read(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let notification_id: NotificationId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.notifications.mark_as_read(notification_id).await {
        Ok(notification) => (StatusCode::OK, Json(notification)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
