//! Transactional persistence seam.
//!
//! All writes go through a unit of work ([`StoreTx`]) opened with
//! [`Store::begin`]. A unit of work either commits every write it made or none
//! of them:
//!
//! - `commit()` persists all writes atomically, then hands the recorded
//!   [`EntityChange`]s to the store's [`ChangeDispatcher`] before returning.
//! - Dropping a `StoreTx` without committing rolls everything back and
//!   notifies nobody.
//!
//! ## Row locking
//!
//! The `lock_*` reads return the current row and hold a write lock on it until
//! the unit of work ends, so two writers that both read-check-write the same
//! row (stock levels, confirmation status) serialize instead of interleaving.
//! The Postgres adapter uses `SELECT ... FOR UPDATE`; the in-memory adapter
//! serializes whole units of work.
//!
//! ## Change recording
//!
//! Every insert/update records one [`EntityChange`]. Writes that belong to a
//! product (the product row, its inventory row, its stock transactions) carry
//! the product id so observers such as the cache invalidator can target it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use lumberyard_core::{
    CategoryId, ConfirmationId, CustomerId, NotificationId, ProductId, SalesOrderId, ServiceOrderId,
};
use lumberyard_events::{ChangeDispatcher, EntityChange};
use lumberyard_inventory::{Inventory, StockTransaction};
use lumberyard_lumbering::{LumberingOutput, LumberingServiceOrder, ShavingsRecord};
use lumberyard_products::{Category, Product};
use lumberyard_sales::{
    ConfirmationSnapshot, ConfirmationStatus, Customer, Delivery, DeliveryStatus, NotificationType,
    OrderNotification, SalesOrder,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Storage failure.
///
/// These are infrastructure errors, as opposed to domain errors (validation,
/// missing rows, invalid transitions), and map to 5xx at the API boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (e.g. a concurrent duplicate insert).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// A row could not be decoded into its domain type.
    #[error("failed to decode row: {0}")]
    Decode(String),

    /// The backend failed (connection, pool, SQL error).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Filter for listing notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationQuery {
    pub unread_only: bool,
    pub limit: Option<usize>,
}

/// Source of units of work.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Observers registered here are called after every successful commit.
    fn change_dispatcher(&self) -> Arc<ChangeDispatcher>;
}

/// One atomic unit of work.
///
/// Reads see this unit's own uncommitted writes.
#[async_trait]
pub trait StoreTx: Send {
    // -------------------------
    // Catalogue
    // -------------------------

    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError>;
    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError>;
    async fn list_categories(&mut self) -> Result<Vec<Category>, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn find_product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError>;
    /// Ordered by name.
    async fn list_products(&mut self, active_only: bool) -> Result<Vec<Product>, StoreError>;

    // -------------------------
    // Stock ledger
    // -------------------------

    async fn insert_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError>;
    async fn update_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError>;
    async fn get_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError>;
    /// Read and row-lock.
    async fn lock_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError>;

    async fn insert_stock_transaction(&mut self, transaction: &StockTransaction) -> Result<(), StoreError>;
    /// Oldest first.
    async fn list_stock_transactions(&mut self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError>;

    // -------------------------
    // Customers and sales orders
    // -------------------------

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn insert_sales_order(&mut self, order: &SalesOrder) -> Result<(), StoreError>;
    async fn get_sales_order(&mut self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError>;
    async fn find_sales_order_by_number(&mut self, order_number: &str) -> Result<Option<SalesOrder>, StoreError>;
    /// Number of orders whose number starts with `prefix`.
    async fn count_sales_orders_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError>;

    // -------------------------
    // Order confirmations
    // -------------------------

    async fn insert_confirmation(&mut self, confirmation: &ConfirmationSnapshot) -> Result<(), StoreError>;
    async fn update_confirmation(&mut self, confirmation: &ConfirmationSnapshot) -> Result<(), StoreError>;
    async fn get_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError>;
    /// Read and row-lock.
    async fn lock_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError>;
    async fn find_confirmation_by_order(
        &mut self,
        sales_order_id: SalesOrderId,
    ) -> Result<Option<ConfirmationSnapshot>, StoreError>;
    /// Newest first. An empty `statuses` slice matches every status.
    async fn list_confirmations(
        &mut self,
        customer_id: Option<CustomerId>,
        statuses: &[ConfirmationStatus],
    ) -> Result<Vec<ConfirmationSnapshot>, StoreError>;

    // -------------------------
    // Notifications
    // -------------------------

    async fn insert_notification(&mut self, notification: &OrderNotification) -> Result<(), StoreError>;
    async fn update_notification(&mut self, notification: &OrderNotification) -> Result<(), StoreError>;
    /// Read and row-lock.
    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<OrderNotification>, StoreError>;
    /// Oldest notification of `notification_type` for the order, if any.
    async fn find_notification(
        &mut self,
        sales_order_id: SalesOrderId,
        notification_type: NotificationType,
    ) -> Result<Option<OrderNotification>, StoreError>;
    /// Newest first.
    async fn list_notifications(
        &mut self,
        customer_id: CustomerId,
        query: NotificationQuery,
    ) -> Result<Vec<OrderNotification>, StoreError>;
    async fn count_unread_notifications(&mut self, customer_id: CustomerId) -> Result<u64, StoreError>;

    // -------------------------
    // Deliveries
    // -------------------------

    async fn insert_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError>;
    async fn update_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError>;
    async fn get_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError>;
    /// Read and row-lock.
    async fn lock_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError>;
    /// Newest first; `None` matches every status.
    async fn list_deliveries(&mut self, status: Option<DeliveryStatus>) -> Result<Vec<Delivery>, StoreError>;

    // -------------------------
    // Lumbering service
    // -------------------------

    async fn insert_service_order(&mut self, order: &LumberingServiceOrder) -> Result<(), StoreError>;
    async fn update_service_order(&mut self, order: &LumberingServiceOrder) -> Result<(), StoreError>;
    async fn get_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError>;
    /// Read and row-lock.
    async fn lock_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError>;

    async fn insert_output(&mut self, output: &LumberingOutput) -> Result<(), StoreError>;
    /// Oldest first.
    async fn list_outputs(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<LumberingOutput>, StoreError>;

    async fn insert_shavings(&mut self, record: &ShavingsRecord) -> Result<(), StoreError>;
    /// Oldest first.
    async fn list_shavings(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<ShavingsRecord>, StoreError>;

    // -------------------------
    // Lifecycle
    // -------------------------

    /// Changes recorded so far in this unit of work.
    fn pending_changes(&self) -> &[EntityChange];

    /// Persist every write, then notify observers.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
