//! Postgres-backed store.
//!
//! Each unit of work is one database transaction. `lock_*` reads use
//! `SELECT ... FOR UPDATE`, so read-check-write sequences on the same row
//! serialize across processes, not only across tasks.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | ColumnDecode / Decode | N/A | `Decode` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//!
//! The schema lives in `migrations/0001_init.sql` and is applied by
//! [`PostgresStore::migrate`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use lumberyard_core::{
    CategoryId, ConfirmationId, CustomerId, DeliveryId, NotificationId, ProductId, SalesOrderId,
    ServiceOrderId, ServiceOutputId, ShavingsRecordId, StockTransactionId, UserId,
};
use lumberyard_events::{ChangeDispatcher, ChangeKind, EntityChange, EntityKind};
use lumberyard_inventory::{Inventory, StockTransaction, TransactionType};
use lumberyard_lumbering::{
    LumberGrade, LumberingOutput, LumberingServiceOrder, ServiceStatus, ShavingsOwnership,
    ShavingsRecord, ShavingsUnit,
};
use lumberyard_products::{Category, Dimensions, Product};
use lumberyard_sales::{
    ConfirmationSnapshot, ConfirmationStatus, Customer, Delivery, DeliveryStatus, NotificationType,
    OrderNotification, OrderSource, PaymentMethod, SalesOrder, SalesOrderItem, SalesOrderStatus,
};

use super::{NotificationQuery, Store, StoreError, StoreTx};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Postgres-backed store.
///
/// Cheap to clone; all clones share the pool and the change dispatcher.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    dispatcher: Arc<ChangeDispatcher>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dispatcher: Arc::new(ChangeDispatcher::new()),
        }
    }

    /// Connect to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create missing tables and indexes. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTx {
            tx,
            changes: Vec::new(),
            dispatcher: self.dispatcher.clone(),
        }))
    }

    fn change_dispatcher(&self) -> Arc<ChangeDispatcher> {
        self.dispatcher.clone()
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    changes: Vec<EntityChange>,
    dispatcher: Arc<ChangeDispatcher>,
}

impl PostgresTx {
    fn record(&mut self, entity: EntityKind, change: ChangeKind, id: impl Into<Uuid>) {
        self.changes.push(EntityChange::new(entity, change, id));
    }

    fn record_for_product(&mut self, entity: EntityKind, change: ChangeKind, id: impl Into<Uuid>, product_id: ProductId) {
        self.changes
            .push(EntityChange::new(entity, change, id).for_product(product_id));
    }

    async fn fetch_optional(&mut self, operation: &str, query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> Result<Option<PgRow>, StoreError> {
        query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn fetch_all(&mut self, operation: &str, query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> Result<Vec<PgRow>, StoreError> {
        query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    /// Execute a write that must touch exactly one row.
    async fn execute_one(&mut self, operation: &str, query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> Result<(), StoreError> {
        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "{operation} affected {} rows, expected 1",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn load_items(&mut self, sales_order_id: SalesOrderId) -> Result<Vec<SalesOrderItem>, StoreError> {
        let rows = self
            .fetch_all(
                "load_items",
                sqlx::query(
                    r#"
                    SELECT product_id, quantity_pieces, unit_price, board_feet, subtotal
                    FROM sales_order_items
                    WHERE sales_order_id = $1
                    ORDER BY line_no ASC
                    "#,
                )
                .bind(*sales_order_id.as_uuid()),
            )
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn with_items(&mut self, row: Option<PgRow>) -> Result<Option<SalesOrder>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = sales_order_from_row(&row)?;
        order.items = self.load_items(order.id).await?;
        Ok(Some(order))
    }
}

const PRODUCT_COLUMNS: &str = "id, sku, name, category_id, thickness_in, width_in, length_ft, \
     price_per_board_foot, price_per_piece, is_active, created_at, updated_at";

const CONFIRMATION_COLUMNS: &str = "id, sales_order_id, customer_id, status, estimated_pickup_date, \
     actual_pickup_date, is_payment_complete, payment_completed_at, confirmed_at, ready_at, \
     picked_up_at, cancelled_at, notes, created_by, created_at, updated_at, version";

const NOTIFICATION_COLUMNS: &str = "id, sales_order_id, customer_id, notification_type, title, message, \
     is_read, read_at, created_at";

const DELIVERY_COLUMNS: &str = "id, delivery_number, sales_order_id, status, created_at, updated_at, delivered_at";

const SERVICE_ORDER_COLUMNS: &str = "id, customer_id, received_date, completed_date, status, wood_type, \
     quantity_logs, estimated_board_feet, service_fee_per_bf, total_service_fee, shavings_ownership, \
     notes, created_by, created_at, updated_at";

const SALES_ORDER_COLUMNS: &str = "id, order_number, customer_id, payment_method, order_source, status, \
     total_amount, amount_paid, balance, created_by, created_at";

#[async_trait]
impl StoreTx for PostgresTx {
    async fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        self.execute_one(
            "insert_category",
            sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, $4)")
                .bind(*category.id.as_uuid())
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.created_at),
        )
        .await?;
        self.record(EntityKind::Category, ChangeKind::Created, category.id);
        Ok(())
    }

    async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = self
            .fetch_optional(
                "get_category",
                sqlx::query("SELECT id, name, description, created_at FROM categories WHERE id = $1")
                    .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>, StoreError> {
        let rows = self
            .fetch_all(
                "list_categories",
                sqlx::query("SELECT id, name, description, created_at FROM categories ORDER BY name ASC"),
            )
            .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.execute_one(
            "insert_product",
            sqlx::query(&format!(
                "INSERT INTO products ({PRODUCT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
            ))
            .bind(*product.id.as_uuid())
            .bind(&product.sku)
            .bind(&product.name)
            .bind(*product.category_id.as_uuid())
            .bind(product.dimensions.thickness_in)
            .bind(product.dimensions.width_in)
            .bind(product.dimensions.length_ft)
            .bind(product.price_per_board_foot)
            .bind(product.price_per_piece)
            .bind(product.is_active)
            .bind(product.created_at)
            .bind(product.updated_at),
        )
        .await?;
        self.record_for_product(EntityKind::Product, ChangeKind::Created, product.id, product.id);
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.execute_one(
            "update_product",
            sqlx::query(
                r#"
                UPDATE products SET
                    sku = $2, name = $3, category_id = $4, thickness_in = $5, width_in = $6,
                    length_ft = $7, price_per_board_foot = $8, price_per_piece = $9,
                    is_active = $10, updated_at = $11
                WHERE id = $1
                "#,
            )
            .bind(*product.id.as_uuid())
            .bind(&product.sku)
            .bind(&product.name)
            .bind(*product.category_id.as_uuid())
            .bind(product.dimensions.thickness_in)
            .bind(product.dimensions.width_in)
            .bind(product.dimensions.length_ft)
            .bind(product.price_per_board_foot)
            .bind(product.price_per_piece)
            .bind(product.is_active)
            .bind(product.updated_at),
        )
        .await?;
        self.record_for_product(EntityKind::Product, ChangeKind::Updated, product.id, product.id);
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = self
            .fetch_optional(
                "get_product",
                sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1")).bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
        let row = self
            .fetch_optional(
                "find_product_by_sku",
                sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1")).bind(sku),
            )
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&mut self, active_only: bool) -> Result<Vec<Product>, StoreError> {
        let rows = self
            .fetch_all(
                "list_products",
                sqlx::query(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products \
                     WHERE ($1 = FALSE OR is_active) ORDER BY name ASC, id ASC"
                ))
                .bind(active_only),
            )
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn insert_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError> {
        self.execute_one(
            "insert_inventory",
            sqlx::query(
                "INSERT INTO inventory (product_id, quantity_pieces, total_board_feet, last_updated) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(*inventory.product_id.as_uuid())
            .bind(inventory.quantity_pieces)
            .bind(inventory.total_board_feet)
            .bind(inventory.last_updated),
        )
        .await?;
        let product_id = inventory.product_id;
        self.record_for_product(EntityKind::Inventory, ChangeKind::Created, product_id, product_id);
        Ok(())
    }

    async fn update_inventory(&mut self, inventory: &Inventory) -> Result<(), StoreError> {
        self.execute_one(
            "update_inventory",
            sqlx::query(
                "UPDATE inventory SET quantity_pieces = $2, total_board_feet = $3, last_updated = $4 \
                 WHERE product_id = $1",
            )
            .bind(*inventory.product_id.as_uuid())
            .bind(inventory.quantity_pieces)
            .bind(inventory.total_board_feet)
            .bind(inventory.last_updated),
        )
        .await?;
        let product_id = inventory.product_id;
        self.record_for_product(EntityKind::Inventory, ChangeKind::Updated, product_id, product_id);
        Ok(())
    }

    async fn get_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let row = self
            .fetch_optional(
                "get_inventory",
                sqlx::query(
                    "SELECT product_id, quantity_pieces, total_board_feet, last_updated \
                     FROM inventory WHERE product_id = $1",
                )
                .bind(*product_id.as_uuid()),
            )
            .await?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    async fn lock_inventory(&mut self, product_id: ProductId) -> Result<Option<Inventory>, StoreError> {
        let row = self
            .fetch_optional(
                "lock_inventory",
                sqlx::query(
                    "SELECT product_id, quantity_pieces, total_board_feet, last_updated \
                     FROM inventory WHERE product_id = $1 FOR UPDATE",
                )
                .bind(*product_id.as_uuid()),
            )
            .await?;
        row.as_ref().map(inventory_from_row).transpose()
    }

    async fn insert_stock_transaction(&mut self, transaction: &StockTransaction) -> Result<(), StoreError> {
        self.execute_one(
            "insert_stock_transaction",
            sqlx::query(
                r#"
                INSERT INTO stock_transactions (
                    id, product_id, transaction_type, quantity_pieces, board_feet, reason,
                    reference_id, cost_per_unit, created_by, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(*transaction.id.as_uuid())
            .bind(*transaction.product_id.as_uuid())
            .bind(transaction.transaction_type.as_str())
            .bind(transaction.quantity_pieces)
            .bind(transaction.board_feet)
            .bind(&transaction.reason)
            .bind(transaction.reference_id.as_deref())
            .bind(transaction.cost_per_unit)
            .bind(transaction.created_by.map(Uuid::from))
            .bind(transaction.created_at),
        )
        .await?;
        self.record_for_product(
            EntityKind::StockTransaction,
            ChangeKind::Created,
            transaction.id,
            transaction.product_id,
        );
        Ok(())
    }

    async fn list_stock_transactions(&mut self, product_id: ProductId) -> Result<Vec<StockTransaction>, StoreError> {
        let rows = self
            .fetch_all(
                "list_stock_transactions",
                sqlx::query(
                    r#"
                    SELECT id, product_id, transaction_type, quantity_pieces, board_feet, reason,
                           reference_id, cost_per_unit, created_by, created_at
                    FROM stock_transactions
                    WHERE product_id = $1
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(*product_id.as_uuid()),
            )
            .await?;
        rows.iter().map(stock_transaction_from_row).collect()
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        self.execute_one(
            "insert_customer",
            sqlx::query(
                "INSERT INTO customers (id, name, email, phone, address, is_walk_in, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(*customer.id.as_uuid())
            .bind(&customer.name)
            .bind(customer.email.as_deref())
            .bind(customer.phone.as_deref())
            .bind(customer.address.as_deref())
            .bind(customer.is_walk_in)
            .bind(customer.created_at),
        )
        .await?;
        self.record(EntityKind::Customer, ChangeKind::Created, customer.id);
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = self
            .fetch_optional(
                "get_customer",
                sqlx::query(
                    "SELECT id, name, email, phone, address, is_walk_in, created_at FROM customers WHERE id = $1",
                )
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn insert_sales_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        self.execute_one(
            "insert_sales_order",
            sqlx::query(&format!(
                "INSERT INTO sales_orders ({SALES_ORDER_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(*order.id.as_uuid())
            .bind(&order.order_number)
            .bind(*order.customer_id.as_uuid())
            .bind(order.payment_method.as_str())
            .bind(order.order_source.as_str())
            .bind(order.status.as_str())
            .bind(order.total_amount)
            .bind(order.amount_paid)
            .bind(order.balance)
            .bind(order.created_by.map(Uuid::from))
            .bind(order.created_at),
        )
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            let line_no = i32::try_from(line_no).map_err(|e| StoreError::Backend(e.to_string()))?;
            self.execute_one(
                "insert_sales_order_item",
                sqlx::query(
                    r#"
                    INSERT INTO sales_order_items (
                        sales_order_id, line_no, product_id, quantity_pieces, unit_price, board_feet, subtotal
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(*order.id.as_uuid())
                .bind(line_no)
                .bind(*item.product_id.as_uuid())
                .bind(item.quantity_pieces)
                .bind(item.unit_price)
                .bind(item.board_feet)
                .bind(item.subtotal),
            )
            .await?;
        }

        self.record(EntityKind::SalesOrder, ChangeKind::Created, order.id);
        Ok(())
    }

    async fn get_sales_order(&mut self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        let row = self
            .fetch_optional(
                "get_sales_order",
                sqlx::query(&format!("SELECT {SALES_ORDER_COLUMNS} FROM sales_orders WHERE id = $1"))
                    .bind(*id.as_uuid()),
            )
            .await?;
        self.with_items(row).await
    }

    async fn find_sales_order_by_number(&mut self, order_number: &str) -> Result<Option<SalesOrder>, StoreError> {
        let row = self
            .fetch_optional(
                "find_sales_order_by_number",
                sqlx::query(&format!(
                    "SELECT {SALES_ORDER_COLUMNS} FROM sales_orders WHERE order_number = $1"
                ))
                .bind(order_number),
            )
            .await?;
        self.with_items(row).await
    }

    async fn count_sales_orders_with_prefix(&mut self, prefix: &str) -> Result<u32, StoreError> {
        let row = self
            .fetch_optional(
                "count_sales_orders_with_prefix",
                sqlx::query("SELECT COUNT(*) AS n FROM sales_orders WHERE starts_with(order_number, $1)")
                    .bind(prefix),
            )
            .await?;
        let count: i64 = match row {
            Some(row) => col(&row, "n")?,
            None => 0,
        };
        u32::try_from(count).map_err(|e| StoreError::Decode(format!("order count: {e}")))
    }

    async fn insert_confirmation(&mut self, c: &ConfirmationSnapshot) -> Result<(), StoreError> {
        let version = version_to_db(c.version)?;
        self.execute_one(
            "insert_confirmation",
            sqlx::query(&format!(
                "INSERT INTO order_confirmations ({CONFIRMATION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
            ))
            .bind(*c.id.as_uuid())
            .bind(*c.sales_order_id.as_uuid())
            .bind(*c.customer_id.as_uuid())
            .bind(c.status.as_str())
            .bind(c.estimated_pickup_date)
            .bind(c.actual_pickup_date)
            .bind(c.is_payment_complete)
            .bind(c.payment_completed_at)
            .bind(c.confirmed_at)
            .bind(c.ready_at)
            .bind(c.picked_up_at)
            .bind(c.cancelled_at)
            .bind(&c.notes)
            .bind(c.created_by.map(Uuid::from))
            .bind(c.created_at)
            .bind(c.updated_at)
            .bind(version),
        )
        .await?;
        self.record(EntityKind::OrderConfirmation, ChangeKind::Created, c.id);
        Ok(())
    }

    async fn update_confirmation(&mut self, c: &ConfirmationSnapshot) -> Result<(), StoreError> {
        let version = version_to_db(c.version)?;
        self.execute_one(
            "update_confirmation",
            sqlx::query(
                r#"
                UPDATE order_confirmations SET
                    status = $2, estimated_pickup_date = $3, actual_pickup_date = $4,
                    is_payment_complete = $5, payment_completed_at = $6, confirmed_at = $7,
                    ready_at = $8, picked_up_at = $9, cancelled_at = $10, notes = $11,
                    updated_at = $12, version = $13
                WHERE id = $1
                "#,
            )
            .bind(*c.id.as_uuid())
            .bind(c.status.as_str())
            .bind(c.estimated_pickup_date)
            .bind(c.actual_pickup_date)
            .bind(c.is_payment_complete)
            .bind(c.payment_completed_at)
            .bind(c.confirmed_at)
            .bind(c.ready_at)
            .bind(c.picked_up_at)
            .bind(c.cancelled_at)
            .bind(&c.notes)
            .bind(c.updated_at)
            .bind(version),
        )
        .await?;
        self.record(EntityKind::OrderConfirmation, ChangeKind::Updated, c.id);
        Ok(())
    }

    async fn get_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        let row = self
            .fetch_optional(
                "get_confirmation",
                sqlx::query(&format!(
                    "SELECT {CONFIRMATION_COLUMNS} FROM order_confirmations WHERE id = $1"
                ))
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(confirmation_from_row).transpose()
    }

    async fn lock_confirmation(&mut self, id: ConfirmationId) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        let row = self
            .fetch_optional(
                "lock_confirmation",
                sqlx::query(&format!(
                    "SELECT {CONFIRMATION_COLUMNS} FROM order_confirmations WHERE id = $1 FOR UPDATE"
                ))
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(confirmation_from_row).transpose()
    }

    async fn find_confirmation_by_order(
        &mut self,
        sales_order_id: SalesOrderId,
    ) -> Result<Option<ConfirmationSnapshot>, StoreError> {
        let row = self
            .fetch_optional(
                "find_confirmation_by_order",
                sqlx::query(&format!(
                    "SELECT {CONFIRMATION_COLUMNS} FROM order_confirmations WHERE sales_order_id = $1"
                ))
                .bind(*sales_order_id.as_uuid()),
            )
            .await?;
        row.as_ref().map(confirmation_from_row).transpose()
    }

    async fn list_confirmations(
        &mut self,
        customer_id: Option<CustomerId>,
        statuses: &[ConfirmationStatus],
    ) -> Result<Vec<ConfirmationSnapshot>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = self
            .fetch_all(
                "list_confirmations",
                sqlx::query(&format!(
                    "SELECT {CONFIRMATION_COLUMNS} FROM order_confirmations \
                     WHERE ($1::uuid IS NULL OR customer_id = $1) \
                       AND (cardinality($2::text[]) = 0 OR status = ANY($2)) \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(customer_id.map(Uuid::from))
                .bind(statuses),
            )
            .await?;
        rows.iter().map(confirmation_from_row).collect()
    }

    async fn insert_notification(&mut self, n: &OrderNotification) -> Result<(), StoreError> {
        self.execute_one(
            "insert_notification",
            sqlx::query(&format!(
                "INSERT INTO order_notifications ({NOTIFICATION_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(*n.id.as_uuid())
            .bind(*n.sales_order_id.as_uuid())
            .bind(*n.customer_id.as_uuid())
            .bind(n.notification_type.as_str())
            .bind(&n.title)
            .bind(&n.message)
            .bind(n.is_read)
            .bind(n.read_at)
            .bind(n.created_at),
        )
        .await?;
        self.record(EntityKind::OrderNotification, ChangeKind::Created, n.id);
        Ok(())
    }

    async fn update_notification(&mut self, n: &OrderNotification) -> Result<(), StoreError> {
        self.execute_one(
            "update_notification",
            sqlx::query("UPDATE order_notifications SET is_read = $2, read_at = $3 WHERE id = $1")
                .bind(*n.id.as_uuid())
                .bind(n.is_read)
                .bind(n.read_at),
        )
        .await?;
        self.record(EntityKind::OrderNotification, ChangeKind::Updated, n.id);
        Ok(())
    }

    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<OrderNotification>, StoreError> {
        let row = self
            .fetch_optional(
                "lock_notification",
                sqlx::query(&format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM order_notifications WHERE id = $1 FOR UPDATE"
                ))
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn find_notification(
        &mut self,
        sales_order_id: SalesOrderId,
        notification_type: NotificationType,
    ) -> Result<Option<OrderNotification>, StoreError> {
        let row = self
            .fetch_optional(
                "find_notification",
                sqlx::query(&format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM order_notifications \
                     WHERE sales_order_id = $1 AND notification_type = $2 \
                     ORDER BY created_at ASC, id ASC LIMIT 1"
                ))
                .bind(*sales_order_id.as_uuid())
                .bind(notification_type.as_str()),
            )
            .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list_notifications(
        &mut self,
        customer_id: CustomerId,
        query: NotificationQuery,
    ) -> Result<Vec<OrderNotification>, StoreError> {
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = self
            .fetch_all(
                "list_notifications",
                sqlx::query(&format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM order_notifications \
                     WHERE customer_id = $1 AND ($2 = FALSE OR NOT is_read) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3"
                ))
                .bind(*customer_id.as_uuid())
                .bind(query.unread_only)
                .bind(limit),
            )
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn count_unread_notifications(&mut self, customer_id: CustomerId) -> Result<u64, StoreError> {
        let row = self
            .fetch_optional(
                "count_unread_notifications",
                sqlx::query(
                    "SELECT COUNT(*) AS n FROM order_notifications WHERE customer_id = $1 AND NOT is_read",
                )
                .bind(*customer_id.as_uuid()),
            )
            .await?;
        let count: i64 = match row {
            Some(row) => col(&row, "n")?,
            None => 0,
        };
        u64::try_from(count).map_err(|e| StoreError::Decode(format!("unread count: {e}")))
    }

    async fn insert_delivery(&mut self, d: &Delivery) -> Result<(), StoreError> {
        self.execute_one(
            "insert_delivery",
            sqlx::query(&format!(
                "INSERT INTO deliveries ({DELIVERY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ))
            .bind(*d.id.as_uuid())
            .bind(&d.delivery_number)
            .bind(*d.sales_order_id.as_uuid())
            .bind(d.status.as_str())
            .bind(d.created_at)
            .bind(d.updated_at)
            .bind(d.delivered_at),
        )
        .await?;
        self.record(EntityKind::Delivery, ChangeKind::Created, d.id);
        Ok(())
    }

    async fn update_delivery(&mut self, d: &Delivery) -> Result<(), StoreError> {
        self.execute_one(
            "update_delivery",
            sqlx::query("UPDATE deliveries SET status = $2, updated_at = $3, delivered_at = $4 WHERE id = $1")
                .bind(*d.id.as_uuid())
                .bind(d.status.as_str())
                .bind(d.updated_at)
                .bind(d.delivered_at),
        )
        .await?;
        self.record(EntityKind::Delivery, ChangeKind::Updated, d.id);
        Ok(())
    }

    async fn get_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError> {
        let row = self
            .fetch_optional(
                "get_delivery_by_order",
                sqlx::query(&format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE sales_order_id = $1"))
                    .bind(*sales_order_id.as_uuid()),
            )
            .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn lock_delivery_by_order(&mut self, sales_order_id: SalesOrderId) -> Result<Option<Delivery>, StoreError> {
        let row = self
            .fetch_optional(
                "lock_delivery_by_order",
                sqlx::query(&format!(
                    "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE sales_order_id = $1 FOR UPDATE"
                ))
                .bind(*sales_order_id.as_uuid()),
            )
            .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn list_deliveries(&mut self, status: Option<DeliveryStatus>) -> Result<Vec<Delivery>, StoreError> {
        let rows = self
            .fetch_all(
                "list_deliveries",
                sqlx::query(&format!(
                    "SELECT {DELIVERY_COLUMNS} FROM deliveries \
                     WHERE ($1::text IS NULL OR status = $1) \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(status.map(DeliveryStatus::as_str)),
            )
            .await?;
        rows.iter().map(delivery_from_row).collect()
    }

    async fn insert_service_order(&mut self, o: &LumberingServiceOrder) -> Result<(), StoreError> {
        self.execute_one(
            "insert_service_order",
            sqlx::query(&format!(
                "INSERT INTO lumbering_service_orders ({SERVICE_ORDER_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
            ))
            .bind(*o.id.as_uuid())
            .bind(*o.customer_id.as_uuid())
            .bind(o.received_date)
            .bind(o.completed_date)
            .bind(o.status.as_str())
            .bind(&o.wood_type)
            .bind(o.quantity_logs)
            .bind(o.estimated_board_feet)
            .bind(o.service_fee_per_bf)
            .bind(o.total_service_fee)
            .bind(o.shavings_ownership.as_str())
            .bind(&o.notes)
            .bind(o.created_by.map(Uuid::from))
            .bind(o.created_at)
            .bind(o.updated_at),
        )
        .await?;
        self.record(EntityKind::LumberingServiceOrder, ChangeKind::Created, o.id);
        Ok(())
    }

    async fn update_service_order(&mut self, o: &LumberingServiceOrder) -> Result<(), StoreError> {
        self.execute_one(
            "update_service_order",
            sqlx::query(
                r#"
                UPDATE lumbering_service_orders SET
                    completed_date = $2, status = $3, total_service_fee = $4, notes = $5, updated_at = $6
                WHERE id = $1
                "#,
            )
            .bind(*o.id.as_uuid())
            .bind(o.completed_date)
            .bind(o.status.as_str())
            .bind(o.total_service_fee)
            .bind(&o.notes)
            .bind(o.updated_at),
        )
        .await?;
        self.record(EntityKind::LumberingServiceOrder, ChangeKind::Updated, o.id);
        Ok(())
    }

    async fn get_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError> {
        let row = self
            .fetch_optional(
                "get_service_order",
                sqlx::query(&format!(
                    "SELECT {SERVICE_ORDER_COLUMNS} FROM lumbering_service_orders WHERE id = $1"
                ))
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(service_order_from_row).transpose()
    }

    async fn lock_service_order(&mut self, id: ServiceOrderId) -> Result<Option<LumberingServiceOrder>, StoreError> {
        let row = self
            .fetch_optional(
                "lock_service_order",
                sqlx::query(&format!(
                    "SELECT {SERVICE_ORDER_COLUMNS} FROM lumbering_service_orders WHERE id = $1 FOR UPDATE"
                ))
                .bind(*id.as_uuid()),
            )
            .await?;
        row.as_ref().map(service_order_from_row).transpose()
    }

    async fn insert_output(&mut self, o: &LumberingOutput) -> Result<(), StoreError> {
        self.execute_one(
            "insert_output",
            sqlx::query(
                r#"
                INSERT INTO lumbering_outputs (
                    id, service_order_id, lumber_type, quantity_pieces, length_ft, width_in,
                    thickness_in, board_feet, grade, notes, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(*o.id.as_uuid())
            .bind(*o.service_order_id.as_uuid())
            .bind(&o.lumber_type)
            .bind(o.quantity_pieces)
            .bind(o.length_ft)
            .bind(o.width_in)
            .bind(o.thickness_in)
            .bind(o.board_feet)
            .bind(o.grade.as_str())
            .bind(&o.notes)
            .bind(o.recorded_at),
        )
        .await?;
        self.record(EntityKind::LumberingOutput, ChangeKind::Created, o.id);
        Ok(())
    }

    async fn list_outputs(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<LumberingOutput>, StoreError> {
        let rows = self
            .fetch_all(
                "list_outputs",
                sqlx::query(
                    r#"
                    SELECT id, service_order_id, lumber_type, quantity_pieces, length_ft, width_in,
                           thickness_in, board_feet, grade, notes, recorded_at
                    FROM lumbering_outputs
                    WHERE service_order_id = $1
                    ORDER BY recorded_at ASC, id ASC
                    "#,
                )
                .bind(*service_order_id.as_uuid()),
            )
            .await?;
        rows.iter().map(output_from_row).collect()
    }

    async fn insert_shavings(&mut self, s: &ShavingsRecord) -> Result<(), StoreError> {
        self.execute_one(
            "insert_shavings",
            sqlx::query(
                r#"
                INSERT INTO shavings_records (
                    id, service_order_id, quantity, unit, customer_share, company_share, notes, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(*s.id.as_uuid())
            .bind(*s.service_order_id.as_uuid())
            .bind(s.quantity)
            .bind(s.unit.as_str())
            .bind(s.customer_share)
            .bind(s.company_share)
            .bind(&s.notes)
            .bind(s.recorded_at),
        )
        .await?;
        self.record(EntityKind::ShavingsRecord, ChangeKind::Created, s.id);
        Ok(())
    }

    async fn list_shavings(&mut self, service_order_id: ServiceOrderId) -> Result<Vec<ShavingsRecord>, StoreError> {
        let rows = self
            .fetch_all(
                "list_shavings",
                sqlx::query(
                    r#"
                    SELECT id, service_order_id, quantity, unit, customer_share, company_share, notes, recorded_at
                    FROM shavings_records
                    WHERE service_order_id = $1
                    ORDER BY recorded_at ASC, id ASC
                    "#,
                )
                .bind(*service_order_id.as_uuid()),
            )
            .await?;
        rows.iter().map(shavings_from_row).collect()
    }

    fn pending_changes(&self) -> &[EntityChange] {
        &self.changes
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresTx {
            tx,
            changes,
            dispatcher,
        } = *self;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        dispatcher.dispatch(&changes);
        Ok(())
    }
}

// -------------------------
// Row decoding
// -------------------------

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Decode(format!("column {name}: {e}")))
}

fn enum_col<T>(row: &PgRow, name: &str, parse: fn(&str) -> Option<T>) -> Result<T, StoreError> {
    let raw: String = col(row, name)?;
    parse(&raw).ok_or_else(|| StoreError::Decode(format!("column {name}: unknown value '{raw}'")))
}

fn user_col(row: &PgRow, name: &str) -> Result<Option<UserId>, StoreError> {
    Ok(col::<Option<Uuid>>(row, name)?.map(UserId::from_uuid))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|e| StoreError::Backend(format!("version out of range: {e}")))
}

fn category_from_row(row: &PgRow) -> Result<Category, StoreError> {
    Ok(Category {
        id: CategoryId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        description: col(row, "description")?,
        created_at: col(row, "created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::from_uuid(col(row, "id")?),
        sku: col(row, "sku")?,
        name: col(row, "name")?,
        category_id: CategoryId::from_uuid(col(row, "category_id")?),
        dimensions: Dimensions {
            thickness_in: col(row, "thickness_in")?,
            width_in: col(row, "width_in")?,
            length_ft: col(row, "length_ft")?,
        },
        price_per_board_foot: col(row, "price_per_board_foot")?,
        price_per_piece: col(row, "price_per_piece")?,
        is_active: col(row, "is_active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn inventory_from_row(row: &PgRow) -> Result<Inventory, StoreError> {
    Ok(Inventory {
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        quantity_pieces: col(row, "quantity_pieces")?,
        total_board_feet: col(row, "total_board_feet")?,
        last_updated: col(row, "last_updated")?,
    })
}

fn stock_transaction_from_row(row: &PgRow) -> Result<StockTransaction, StoreError> {
    Ok(StockTransaction {
        id: StockTransactionId::from_uuid(col(row, "id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        transaction_type: enum_col(row, "transaction_type", TransactionType::parse)?,
        quantity_pieces: col(row, "quantity_pieces")?,
        board_feet: col(row, "board_feet")?,
        reason: col(row, "reason")?,
        reference_id: col(row, "reference_id")?,
        cost_per_unit: col(row, "cost_per_unit")?,
        created_by: user_col(row, "created_by")?,
        created_at: col(row, "created_at")?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: CustomerId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        email: col(row, "email")?,
        phone: col(row, "phone")?,
        address: col(row, "address")?,
        is_walk_in: col(row, "is_walk_in")?,
        created_at: col(row, "created_at")?,
    })
}

/// Header only; `items` is filled by the caller.
fn sales_order_from_row(row: &PgRow) -> Result<SalesOrder, StoreError> {
    Ok(SalesOrder {
        id: SalesOrderId::from_uuid(col(row, "id")?),
        order_number: col(row, "order_number")?,
        customer_id: CustomerId::from_uuid(col(row, "customer_id")?),
        items: Vec::new(),
        payment_method: enum_col(row, "payment_method", PaymentMethod::parse)?,
        order_source: enum_col(row, "order_source", OrderSource::parse)?,
        status: enum_col(row, "status", SalesOrderStatus::parse)?,
        total_amount: col(row, "total_amount")?,
        amount_paid: col(row, "amount_paid")?,
        balance: col(row, "balance")?,
        created_by: user_col(row, "created_by")?,
        created_at: col(row, "created_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<SalesOrderItem, StoreError> {
    Ok(SalesOrderItem {
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        quantity_pieces: col(row, "quantity_pieces")?,
        unit_price: col(row, "unit_price")?,
        board_feet: col(row, "board_feet")?,
        subtotal: col(row, "subtotal")?,
    })
}

fn confirmation_from_row(row: &PgRow) -> Result<ConfirmationSnapshot, StoreError> {
    let version: i64 = col(row, "version")?;
    Ok(ConfirmationSnapshot {
        id: ConfirmationId::from_uuid(col(row, "id")?),
        sales_order_id: SalesOrderId::from_uuid(col(row, "sales_order_id")?),
        customer_id: CustomerId::from_uuid(col(row, "customer_id")?),
        status: enum_col(row, "status", ConfirmationStatus::parse)?,
        estimated_pickup_date: col(row, "estimated_pickup_date")?,
        actual_pickup_date: col(row, "actual_pickup_date")?,
        is_payment_complete: col(row, "is_payment_complete")?,
        payment_completed_at: col(row, "payment_completed_at")?,
        confirmed_at: col(row, "confirmed_at")?,
        ready_at: col(row, "ready_at")?,
        picked_up_at: col(row, "picked_up_at")?,
        cancelled_at: col(row, "cancelled_at")?,
        notes: col(row, "notes")?,
        created_by: user_col(row, "created_by")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        version: u64::try_from(version).map_err(|e| StoreError::Decode(format!("column version: {e}")))?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<OrderNotification, StoreError> {
    Ok(OrderNotification {
        id: NotificationId::from_uuid(col(row, "id")?),
        sales_order_id: SalesOrderId::from_uuid(col(row, "sales_order_id")?),
        customer_id: CustomerId::from_uuid(col(row, "customer_id")?),
        notification_type: enum_col(row, "notification_type", NotificationType::parse)?,
        title: col(row, "title")?,
        message: col(row, "message")?,
        is_read: col(row, "is_read")?,
        read_at: col(row, "read_at")?,
        created_at: col(row, "created_at")?,
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, StoreError> {
    Ok(Delivery {
        id: DeliveryId::from_uuid(col(row, "id")?),
        delivery_number: col(row, "delivery_number")?,
        sales_order_id: SalesOrderId::from_uuid(col(row, "sales_order_id")?),
        status: enum_col(row, "status", DeliveryStatus::parse)?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        delivered_at: col(row, "delivered_at")?,
    })
}

fn service_order_from_row(row: &PgRow) -> Result<LumberingServiceOrder, StoreError> {
    Ok(LumberingServiceOrder {
        id: ServiceOrderId::from_uuid(col(row, "id")?),
        customer_id: CustomerId::from_uuid(col(row, "customer_id")?),
        received_date: col(row, "received_date")?,
        completed_date: col(row, "completed_date")?,
        status: enum_col(row, "status", ServiceStatus::parse)?,
        wood_type: col(row, "wood_type")?,
        quantity_logs: col(row, "quantity_logs")?,
        estimated_board_feet: col(row, "estimated_board_feet")?,
        service_fee_per_bf: col(row, "service_fee_per_bf")?,
        total_service_fee: col(row, "total_service_fee")?,
        shavings_ownership: enum_col(row, "shavings_ownership", ShavingsOwnership::parse)?,
        notes: col(row, "notes")?,
        created_by: user_col(row, "created_by")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn output_from_row(row: &PgRow) -> Result<LumberingOutput, StoreError> {
    Ok(LumberingOutput {
        id: ServiceOutputId::from_uuid(col(row, "id")?),
        service_order_id: ServiceOrderId::from_uuid(col(row, "service_order_id")?),
        lumber_type: col(row, "lumber_type")?,
        quantity_pieces: col(row, "quantity_pieces")?,
        length_ft: col(row, "length_ft")?,
        width_in: col(row, "width_in")?,
        thickness_in: col(row, "thickness_in")?,
        board_feet: col(row, "board_feet")?,
        grade: enum_col(row, "grade", LumberGrade::parse)?,
        notes: col(row, "notes")?,
        recorded_at: col(row, "recorded_at")?,
    })
}

fn shavings_from_row(row: &PgRow) -> Result<ShavingsRecord, StoreError> {
    Ok(ShavingsRecord {
        id: ShavingsRecordId::from_uuid(col(row, "id")?),
        service_order_id: ServiceOrderId::from_uuid(col(row, "service_order_id")?),
        quantity: col(row, "quantity")?,
        unit: enum_col(row, "unit", ShavingsUnit::parse)?,
        customer_share: col(row, "customer_share")?,
        company_share: col(row, "company_share")?,
        notes: col(row, "notes")?,
        recorded_at: col(row, "recorded_at")?,
    })
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
