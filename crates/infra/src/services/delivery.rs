//! Delivery hand-off: one delivery per sales order, opened when the order is
//! ready and closed when it is picked up.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lumberyard_core::SalesOrderId;
use lumberyard_sales::{Delivery, DeliveryStatus};

use super::ServiceResult;
use crate::store::{Store, StoreTx};

#[derive(Clone)]
pub struct DeliveryService {
    store: Arc<dyn Store>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_by_order(&self, sales_order_id: SalesOrderId) -> ServiceResult<Option<Delivery>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.get_delivery_by_order(sales_order_id).await?)
    }

    /// Deliveries waiting for pickup, newest first.
    pub async fn list_pending(&self) -> ServiceResult<Vec<Delivery>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_deliveries(Some(DeliveryStatus::Pending)).await?)
    }
}

/// Get-or-create the order's delivery. The flag says whether it was created.
pub(crate) async fn open_in_tx(
    tx: &mut dyn StoreTx,
    sales_order_id: SalesOrderId,
    order_number: &str,
    now: DateTime<Utc>,
) -> ServiceResult<(Delivery, bool)> {
    if let Some(existing) = tx.lock_delivery_by_order(sales_order_id).await? {
        return Ok((existing, false));
    }

    let delivery = Delivery::pending_for(sales_order_id, order_number, now);
    tx.insert_delivery(&delivery).await?;

    tracing::info!(
        order_id = %sales_order_id,
        delivery_number = %delivery.delivery_number,
        "delivery opened"
    );
    Ok((delivery, true))
}

/// Mark the order's delivery delivered. A missing delivery is not an error.
pub(crate) async fn complete_in_tx(
    tx: &mut dyn StoreTx,
    sales_order_id: SalesOrderId,
    now: DateTime<Utc>,
) -> ServiceResult<Option<Delivery>> {
    let Some(mut delivery) = tx.lock_delivery_by_order(sales_order_id).await? else {
        tracing::warn!(order_id = %sales_order_id, "picked up without a delivery record");
        return Ok(None);
    };

    if delivery.mark_delivered(now) {
        tx.update_delivery(&delivery).await?;
        tracing::info!(order_id = %sales_order_id, delivery_number = %delivery.delivery_number, "delivery completed");
    }
    Ok(Some(delivery))
}
