use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use lumberyard_core::{
    CategoryId, ConfirmationId, CustomerId, NotificationId, ProductId, SalesOrderId, ServiceOrderId,
};
use lumberyard_events::{ChangeDispatcher, ChangeKind, EntityChange, EntityKind};
use lumberyard_inventory::{Inventory, StockTransaction};
use lumberyard_lumbering::{LumberingOutput, LumberingServiceOrder, ShavingsRecord};
use lumberyard_products::{Category, Product};
use lumberyard_sales::{
    ConfirmationSnapshot, ConfirmationStatus, Customer, Delivery, DeliveryStatus, NotificationType,
    OrderNotification, SalesOrder,
};

use super::{NotificationQuery, Store, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    inventory: HashMap<ProductId, Inventory>,
    stock_transactions: Vec<StockTransaction>,
    customers: HashMap<CustomerId, Customer>,
    sales_orders: HashMap<SalesOrderId, SalesOrder>,
    confirmations: HashMap<ConfirmationId, ConfirmationSnapshot>,
    notifications: HashMap<NotificationId, OrderNotification>,
    deliveries: HashMap<SalesOrderId, Delivery>,
    service_orders: HashMap<ServiceOrderId, LumberingServiceOrder>,
    outputs: Vec<LumberingOutput>,
    shavings: Vec<ShavingsRecord>,
}

/// In-memory store.
///
/// Intended for tests/dev. A unit of work holds the whole store exclusively
/// from `begin()` until it commits or is dropped, and writes to a private copy
/// of the tables, so rollback is simply discarding that copy.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    dispatcher: Arc<ChangeDispatcher>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            changes: Vec::new(),
            dispatcher: self.dispatcher.clone(),
        }))
    }

    fn change_dispatcher(&self) -> Arc<ChangeDispatcher> {
        self.dispatcher.clone()
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    changes: Vec<EntityChange>,
    dispatcher: Arc<ChangeDispatcher>,
}

impl InMemoryTx {
    fn record(&mut self, entity: EntityKind, change: ChangeKind, id: impl Into<Uuid>) {
        self.changes.push(EntityChange::new(entity, change, id));
    }

    fn record_for_product(&mut self, entity: EntityKind, change: ChangeKind, id: impl Into<Uuid>, product_id: ProductId) {
        self.changes
            .push(EntityChange::new(entity, change, id).for_product(product_id));
    }
}

fn conflict(what: &str, key: impl std::fmt::Display) -> StoreError {
    StoreError::Conflict(format!("{what} '{key}' already exists"))
}

fn missing(what: &str, key: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("update of missing {what} '{key}'"))
}

/// Newest first, ties broken by id (UUIDv7, so also creation order).
fn newest_first<T, K: Ord>(rows: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, K)) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        if self.working.categories.contains_key(&category.id) {
            return Err(conflict("category", category.id));
        }
        self.working.categories.insert(category.id, category.clone());
        self.record(EntityKind::Category, ChangeKind::Created, category.id);
        Ok(())
    }

    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>, StoreError> {
        let mut rows: Vec<_> = self.working.categories.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self.working.products.contains_key(&product.id) {
            return Err(conflict("product", product.id));
        }
        if self.working.products.values().any(|p| p.sku == product.sku) {
            return Err(conflict("sku", &product.sku));
        }
        self.working.products.insert(product.id, product.clone());
        self.record_for_product(EntityKind::Product, ChangeKind::Created, product.id, product.id);
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self
            .working
            .products
            .values()
            .any(|p| p.sku == product.sku && p.id != product.id)
        {
            return Err(conflict("sku", &product.sku));
        }
        let Some(row) = self.working.products.get_mut(&product.id) else {
            return Err(missing("product", product.id));
        };
        *row = product.clone();
        self.record_for_product(EntityKind::Product, ChangeKind::Updated, product.id, product.id);
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn find_product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.values().find(|p| p.sku == sku).cloned())
    }

    async fn list_products(&mut self, active_only: bool) -> Result<Vec<Product>, StoreError> {
        let mut rows: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError> {
        let product_id = inventory.product_id;
        if self.working.inventory.contains_key(&product_id) {
            return Err(conflict("inventory for product", product_id));
        }
        self.working.inventory.insert(product_id, inventory.clone());
        self.record_for_product(EntityKind::Inventory, ChangeKind::Created, product_id, product_id);
        Ok(())
    }

    async fn update_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError> {
        let product_id = inventory.product_id;
        let Some(row) = self.working.inventory.get_mut(&product_id) else {
            return Err(missing("inventory for product", product_id));
        };
        *row = inventory.clone();
        self.record_for_product(EntityKind::Inventory, ChangeKind::Updated, product_id, product_id);
        Ok(())
    }

    async fn get_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        Ok(self.working.inventory.get(&product_id).cloned())
    }

    async fn lock_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        // The whole store is already held by this unit of work.
        self.get_inventory(product_id).await
    }

    async fn insert_stock_transaction(&mut self, transaction: &StockTransaction) -> Result<(), StoreError> {
        self.working.stock_transactions.push(transaction.clone());
        self.record_for_product(
            EntityKind::StockTransaction,
            ChangeKind::Created,
            transaction.id,
            transaction.product_id,
        );
        Ok(())
    }

    async fn list_stock_transactions(&mut self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError> {
        Ok(self
            .working
            .stock_transactions
            .iter()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        if self.working.customers.contains_key(&customer.id) {
            return Err(conflict("customer", customer.id));
        }
        self.working.customers.insert(customer.id, customer.clone());
        self.record(EntityKind::Customer, ChangeKind::Created, customer.id);
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn insert_sales_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        if self
            .working
            .sales_orders
            .values()
            .any(|o| o.id == order.id || o.order_number == order.order_number)
        {
            return Err(conflict("sales order", &order.order_number));
        }
        self.working.sales_orders.insert(order.id, order.clone());
        self.record(EntityKind::SalesOrder, ChangeKind::Created, order.id);
        Ok(())
    }

    async fn get_sales_order(&mut self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self.working.sales_orders.get(&id).cloned())
    }

    async fn find_sales_order_by_number(&mut self, order_number: &str) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self
            .working
            .sales_orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn count_sales_orders_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError> {
        let count = self
            .working
            .sales_orders
            .values()
            .filter(|o| o.order_number.starts_with(prefix))
            .count();
        u32::try_from(count).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn insert_confirmation(&mut self, confirmation: &ConfirmationSnapshot) -> Result<(), StoreError> {
        if self
            .working
            .confirmations
            .values()
            .any(|c| c.id == confirmation.id || c.sales_order_id == confirmation.sales_order_id)
        {
            return Err(conflict("confirmation for order", confirmation.sales_order_id));
        }
        self.working
            .confirmations
            .insert(confirmation.id, confirmation.clone());
        self.record(EntityKind::OrderConfirmation, ChangeKind::Created, confirmation.id);
        Ok(())
    }

    async fn update_confirmation(&mut self, confirmation: &ConfirmationSnapshot) -> Result<(), StoreError> {
        let Some(row) = self.working.confirmations.get_mut(&confirmation.id) else {
            return Err(missing("confirmation", confirmation.id));
        };
        *row = confirmation.clone();
        self.record(EntityKind::OrderConfirmation, ChangeKind::Updated, confirmation.id);
        Ok(())
    }

    async fn get_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        Ok(self.working.confirmations.get(&id).cloned())
    }

    async fn lock_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        self.get_confirmation(id).await
    }

    async fn find_confirmation_by_order(
        &mut self,
        sales_order_id: SalesOrderId,
    ) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        Ok(self
            .working
            .confirmations
            .values()
            .find(|c| c.sales_order_id == sales_order_id)
            .cloned())
    }

    async fn list_confirmations(
        &mut self,
        customer_id: Option<CustomerId>,
        statuses: &[ConfirmationStatus],
    ) -> Result<Vec<ConfirmationSnapshot>, StoreError> {
        let mut rows: Vec<_> = self
            .working
            .confirmations
            .values()
            .filter(|c| customer_id.is_none_or(|id| c.customer_id == id))
            .filter(|c| statuses.is_empty() || statuses.contains(&c.status))
            .cloned()
            .collect();
        newest_first(&mut rows, |c| (c.created_at, c.id));
        Ok(rows)
    }

    async fn insert_notification(&mut self, notification: &OrderNotification) -> Result<(), StoreError> {
        if self.working.notifications.contains_key(&notification.id) {
            return Err(conflict("notification", notification.id));
        }
        if notification.notification_type.is_unique_per_order()
            && self.working.notifications.values().any(|n| {
                n.sales_order_id == notification.sales_order_id
                    && n.notification_type == notification.notification_type
            })
        {
            return Err(conflict(
                notification.notification_type.as_str(),
                notification.sales_order_id,
            ));
        }
        self.working
            .notifications
            .insert(notification.id, notification.clone());
        self.record(EntityKind::OrderNotification, ChangeKind::Created, notification.id);
        Ok(())
    }

    async fn update_notification(&mut self, notification: &OrderNotification) -> Result<(), StoreError> {
        let Some(row) = self.working.notifications.get_mut(&notification.id) else {
            return Err(missing("notification", notification.id));
        };
        *row = notification.clone();
        self.record(EntityKind::OrderNotification, ChangeKind::Updated, notification.id);
        Ok(())
    }

    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<OrderNotification>, StoreError> {
        Ok(self.working.notifications.get(&id).cloned())
    }

    async fn find_notification(
        &mut self,
        sales_order_id: SalesOrderId,
        notification_type: NotificationType,
    ) -> Result<Option<OrderNotification>, StoreError> {
        Ok(self
            .working
            .notifications
            .values()
            .filter(|n| n.sales_order_id == sales_order_id && n.notification_type == notification_type)
            .min_by_key(|n| (n.created_at, n.id))
            .cloned())
    }

    async fn list_notifications(
        &mut self,
        customer_id: CustomerId,
        query: NotificationQuery,
    ) -> Result<Vec<OrderNotification>, StoreError> {
        let mut rows: Vec<_> = self
            .working
            .notifications
            .values()
            .filter(|n| n.customer_id == customer_id)
            .filter(|n| !query.unread_only || !n.is_read)
            .cloned()
            .collect();
        newest_first(&mut rows, |n| (n.created_at, n.id));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count_unread_notifications(&mut self, customer_id: CustomerId) -> Result<u64, StoreError> {
        Ok(self
            .working
            .notifications
            .values()
            .filter(|n| n.customer_id == customer_id && !n.is_read)
            .count() as u64)
    }

    async fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError> {
        if self.working.deliveries.contains_key(&delivery.sales_order_id) {
            return Err(conflict("delivery for order", delivery.sales_order_id));
        }
        self.working
            .deliveries
            .insert(delivery.sales_order_id, delivery.clone());
        self.record(EntityKind::Delivery, ChangeKind::Created, delivery.id);
        Ok(())
    }

    async fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError> {
        let Some(row) = self.working.deliveries.get_mut(&delivery.sales_order_id) else {
            return Err(missing("delivery", delivery.id));
        };
        *row = delivery.clone();
        self.record(EntityKind::Delivery, ChangeKind::Updated, delivery.id);
        Ok(())
    }

    async fn get_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError> {
        Ok(self.working.deliveries.get(&sales_order_id).cloned())
    }

    async fn lock_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError> {
        self.get_delivery_by_order(sales_order_id).await
    }

    async fn list_deliveries(&mut self, status: Option<DeliveryStatus>) -> Result<Vec<Delivery>, StoreError> {
        let mut rows: Vec<_> = self
            .working
            .deliveries
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        newest_first(&mut rows, |d| (d.created_at, d.id));
        Ok(rows)
    }

    async fn insert_service_order(&mut self, order: &LumberingServiceOrder) -> Result<(), StoreError> {
        if self.working.service_orders.contains_key(&order.id) {
            return Err(conflict("service order", order.id));
        }
        self.working.service_orders.insert(order.id, order.clone());
        self.record(EntityKind::LumberingServiceOrder, ChangeKind::Created, order.id);
        Ok(())
    }

    async fn update_service_order(&mut self, order: &LumberingServiceOrder) -> Result<(), StoreError> {
        let Some(row) = self.working.service_orders.get_mut(&order.id) else {
            return Err(missing("service order", order.id));
        };
        *row = order.clone();
        self.record(EntityKind::LumberingServiceOrder, ChangeKind::Updated, order.id);
        Ok(())
    }

    async fn get_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError> {
        Ok(self.working.service_orders.get(&id).cloned())
    }

    async fn lock_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError> {
        self.get_service_order(id).await
    }

    async fn insert_output(&mut self, output: &LumberingOutput) -> Result<(), StoreError> {
        self.working.outputs.push(output.clone());
        self.record(EntityKind::LumberingOutput, ChangeKind::Created, output.id);
        Ok(())
    }

    async fn list_outputs(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<LumberingOutput>, StoreError> {
        Ok(self
            .working
            .outputs
            .iter()
            .filter(|o| o.service_order_id == service_order_id)
            .cloned()
            .collect())
    }

    async fn insert_shavings(&mut self, record: &ShavingsRecord) -> Result<(), StoreError> {
        self.working.shavings.push(record.clone());
        self.record(EntityKind::ShavingsRecord, ChangeKind::Created, record.id);
        Ok(())
    }

    async fn list_shavings(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<ShavingsRecord>, StoreError> {
        Ok(self
            .working
            .shavings
            .iter()
            .filter(|s| s.service_order_id == service_order_id)
            .cloned()
            .collect())
    }

    fn pending_changes(&self) -> &[EntityChange] {
        &self.changes
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx {
            mut guard,
            working,
            changes,
            dispatcher,
        } = *self;

        *guard = working;
        // Observers run before the next unit of work can see the new state.
        dispatcher.dispatch(&changes);
        drop(guard);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumberyard_events::WriteObserver;
    use lumberyard_products::{Dimensions, NewCategory, NewProduct};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        batches: StdMutex<Vec<Vec<EntityChange>>>,
    }

    impl WriteObserver for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn on_commit(&self, changes: &[EntityChange]) {
            self.batches.lock().unwrap().push(changes.to_vec());
        }
    }

    fn test_product(category_id: CategoryId, sku: &str) -> Product {
        Product::create(
            NewProduct {
                sku: sku.to_string(),
                name: "2x4 Pine".to_string(),
                category_id,
                dimensions: Dimensions::new(dec!(2), dec!(4), dec!(8)).unwrap(),
                price_per_board_foot: dec!(3.00),
                price_per_piece: dec!(16.00),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn test_category() -> Category {
        Category::create(
            NewCategory {
                name: "Softwood".to_string(),
                description: String::new(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn commit_persists_and_notifies_once() {
        let store = InMemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store.change_dispatcher().register(recorder.clone());

        let category = test_category();
        let product = test_product(category.id, "PINE-2x4x8");

        let mut tx = store.begin().await.unwrap();
        tx.insert_category(&category).await.unwrap();
        tx.insert_product(&product).await.unwrap();
        tx.insert_inventory(&Inventory::empty(product.id, Utc::now()))
            .await
            .unwrap();
        assert_eq!(tx.pending_changes().len(), 3);
        tx.commit().await.unwrap();

        let batches = recorder.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let product_changes = batches[0]
            .iter()
            .filter(|c| c.product_id == Some(product.id))
            .count();
        assert_eq!(product_changes, 2);
        drop(batches);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_product(product.id).await.unwrap(), Some(product));
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back_silently() {
        let store = InMemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store.change_dispatcher().register(recorder.clone());

        let category = test_category();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_category(&category).await.unwrap();
            assert!(tx.get_category(category.id).await.unwrap().is_some());
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_category(category.id).await.unwrap().is_none());
        assert!(recorder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts() {
        let store = InMemoryStore::new();
        let category = test_category();

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&test_product(category.id, "SKU-1"))
            .await
            .unwrap();
        let err = tx
            .insert_product(&test_product(category.id, "SKU-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_payment_completed_notification_conflicts() {
        let store = InMemoryStore::new();
        let order_id = SalesOrderId::new();
        let customer_id = CustomerId::new();
        let make = |t| {
            OrderNotification::new(
                order_id,
                customer_id,
                t,
                lumberyard_sales::NotificationContent::payment_completed("SO-1"),
                Utc::now(),
            )
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_notification(&make(NotificationType::PaymentCompleted))
            .await
            .unwrap();
        tx.insert_notification(&make(NotificationType::ReadyForPickup))
            .await
            .unwrap();
        tx.insert_notification(&make(NotificationType::ReadyForPickup))
            .await
            .unwrap();
        let err = tx
            .insert_notification(&make(NotificationType::PaymentCompleted))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tx.count_unread_notifications(customer_id).await.unwrap(), 3);
    }
}
