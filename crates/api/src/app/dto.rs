use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use lumberyard_core::UserId;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StockInRequest {
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub cost_per_unit: Option<Decimal>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct StockOutRequest {
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub quantity_change: i64,
    pub reason: String,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct WalkInRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub estimated_pickup_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PickedUpRequest {
    #[serde(default)]
    pub actual_pickup_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteServiceOrderRequest {
    #[serde(default)]
    pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceOrderRequest {
    #[serde(flatten)]
    pub order: lumberyard_lumbering::NewServiceOrder,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub unread_only: bool,
}
