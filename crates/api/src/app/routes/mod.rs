use axum::http::StatusCode;
use axum::Router;

pub mod confirmations;
pub mod customers;
pub mod deliveries;
pub mod inventory;
pub mod lumbering;
pub mod notifications;
pub mod products;
pub mod sales;

/// Router for every domain area.
pub fn router() -> Router {
    Router::new()
        .nest("/categories", products::categories_router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/customers", customers::router())
        .nest("/sales/orders", sales::router())
        .nest("/confirmations", confirmations::router())
        .nest("/notifications", notifications::router())
        .nest("/deliveries", deliveries::router())
        .nest("/lumbering/orders", lumbering::router())
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
