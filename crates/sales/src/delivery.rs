use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{DeliveryId, Entity, SalesOrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }
}

/// Fulfilment record; one per sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub delivery_number: String,
    pub sales_order_id: SalesOrderId,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// New pending delivery for an order that just became ready.
    pub fn pending_for(sales_order_id: SalesOrderId, order_number: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: DeliveryId::new(),
            delivery_number: delivery_number_for(order_number),
            sales_order_id,
            status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    /// Returns `false` if it was already delivered.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == DeliveryStatus::Delivered {
            return false;
        }
        self.status = DeliveryStatus::Delivered;
        self.delivered_at = Some(now);
        self.updated_at = now;
        true
    }
}

impl Entity for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `DEL-` followed by the last dash-separated segment of the order number.
pub fn delivery_number_for(order_number: &str) -> String {
    let suffix = order_number.rsplit('-').next().unwrap_or(order_number);
    format!("DEL-{suffix}")
}
