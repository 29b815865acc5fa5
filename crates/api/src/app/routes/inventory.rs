use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use lumberyard_core::ProductId;
use lumberyard_infra::Services;
use lumberyard_inventory::{Inventory, StockTransaction};

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:product_id", get(get_inventory))
        .route("/:product_id/transactions", get(list_transactions))
        .route("/:product_id/stock-in", post(stock_in))
        .route("/:product_id/stock-out", post(stock_out))
        .route("/:product_id/adjust", post(adjust_stock))
}

fn movement_response(inventory: Inventory, transaction: StockTransaction) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "inventory": inventory,
            "transaction": transaction,
        })),
    )
        .into_response()
}

pub async fn get_inventory(
    Extension(services): Extension<Arc<Services>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.inventory(product_id).await {
        Ok(inventory) => (StatusCode::OK, Json(inventory)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<Services>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.transactions(product_id).await {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn stock_in(
    Extension(services): Extension<Arc<Services>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::StockInRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services
        .ledger
        .stock_in(
            product_id,
            body.quantity,
            &body.reason,
            body.reference_id,
            body.cost_per_unit,
            body.created_by,
        )
        .await;
    match result {
        Ok((inventory, transaction)) => movement_response(inventory, transaction),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn stock_out(
    Extension(services): Extension<Arc<Services>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::StockOutRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services
        .ledger
        .stock_out(product_id, body.quantity, &body.reason, body.reference_id, body.created_by)
        .await;
    match result {
        Ok((inventory, transaction)) => movement_response(inventory, transaction),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<Services>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services
        .ledger
        .adjust_stock(product_id, body.quantity_change, &body.reason, body.created_by)
        .await;
    match result {
        Ok((inventory, transaction)) => movement_response(inventory, transaction),
        Err(e) => errors::service_error_to_response(e),
    }
}
