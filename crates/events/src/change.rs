//! Entity-change records emitted by persistence adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumberyard_core::ProductId;

use crate::Event;

/// Which table a write touched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    Product,
    Inventory,
    StockTransaction,
    Customer,
    SalesOrder,
    OrderConfirmation,
    OrderNotification,
    Delivery,
    LumberingServiceOrder,
    LumberingOutput,
    ShavingsRecord,
}

impl EntityKind {
    /// Entities whose writes can change what a product read (detail or list) returns.
    pub fn affects_product_reads(self) -> bool {
        matches!(
            self,
            EntityKind::Product | EntityKind::Inventory | EntityKind::StockTransaction
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Product => "product",
            EntityKind::Inventory => "inventory",
            EntityKind::StockTransaction => "stock_transaction",
            EntityKind::Customer => "customer",
            EntityKind::SalesOrder => "sales_order",
            EntityKind::OrderConfirmation => "order_confirmation",
            EntityKind::OrderNotification => "order_notification",
            EntityKind::Delivery => "delivery",
            EntityKind::LumberingServiceOrder => "lumbering_service_order",
            EntityKind::LumberingOutput => "lumbering_output",
            EntityKind::ShavingsRecord => "shavings_record",
        }
    }
}

/// What kind of write happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One committed write against one row.
///
/// `product_id` is filled for every write that belongs to a product (the
/// product row itself, its inventory row, its stock transactions) so that
/// observers can target per-product state without loading the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity: EntityKind,
    pub change: ChangeKind,
    pub entity_id: Uuid,
    pub product_id: Option<ProductId>,
    pub occurred_at: DateTime<Utc>,
}

impl EntityChange {
    pub fn new(entity: EntityKind, change: ChangeKind, entity_id: impl Into<Uuid>) -> Self {
        Self {
            entity,
            change,
            entity_id: entity_id.into(),
            product_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attach the owning product.
    pub fn for_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }
}

impl Event for EntityChange {
    fn event_type(&self) -> &'static str {
        match (self.entity, self.change) {
            (EntityKind::Product, ChangeKind::Created) => "product.created",
            (EntityKind::Product, ChangeKind::Updated) => "product.updated",
            (EntityKind::Product, ChangeKind::Deleted) => "product.deleted",
            (EntityKind::Inventory, ChangeKind::Created) => "inventory.created",
            (EntityKind::Inventory, ChangeKind::Updated) => "inventory.updated",
            (EntityKind::Inventory, ChangeKind::Deleted) => "inventory.deleted",
            (EntityKind::StockTransaction, ChangeKind::Created) => "stock_transaction.created",
            (EntityKind::StockTransaction, ChangeKind::Updated) => "stock_transaction.updated",
            (EntityKind::StockTransaction, ChangeKind::Deleted) => "stock_transaction.deleted",
            (_, ChangeKind::Created) => "entity.created",
            (_, ChangeKind::Updated) => "entity.updated",
            (_, ChangeKind::Deleted) => "entity.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_product_family_affects_product_reads() {
        assert!(EntityKind::Product.affects_product_reads());
        assert!(EntityKind::Inventory.affects_product_reads());
        assert!(EntityKind::StockTransaction.affects_product_reads());
        assert!(!EntityKind::OrderNotification.affects_product_reads());
        assert!(!EntityKind::Category.affects_product_reads());
    }

    #[test]
    fn event_type_names_product_family() {
        let product_id = ProductId::new();
        let change = EntityChange::new(EntityKind::Inventory, ChangeKind::Updated, *product_id.as_uuid())
            .for_product(product_id);
        assert_eq!(change.event_type(), "inventory.updated");
        assert_eq!(change.product_id, Some(product_id));
    }
}
