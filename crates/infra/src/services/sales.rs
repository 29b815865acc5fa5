use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{CustomerId, DomainError, ProductId, SalesOrderId, UserId};
use lumberyard_inventory::StockRequest;
use lumberyard_sales::{
    Customer, NewCustomer, OrderSource, PaymentMethod, SalesOrder, SalesOrderItem, order_number,
    order_number_prefix,
};

use super::{ServiceResult, found, ledger};
use crate::store::Store;

/// Reason recorded on the stock-out of every sold line.
pub const SALE_REASON: &str = "Sale";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity_pieces: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalesOrder {
    pub customer_id: CustomerId,
    pub items: Vec<NewOrderLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub order_source: OrderSource,
    #[serde(default)]
    pub amount_paid: Decimal,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

#[derive(Clone)]
pub struct SalesService {
    store: Arc<dyn Store>,
}

impl SalesService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_customer(&self, input: NewCustomer) -> ServiceResult<Customer> {
        let customer = Customer::create(input, Utc::now())?;
        self.insert_customer(customer).await
    }

    /// Ad-hoc customer for a counter sale.
    #[tracing::instrument(skip(self))]
    pub async fn walk_in_customer(&self, name: &str) -> ServiceResult<Customer> {
        self.insert_customer(Customer::walk_in(name, Utc::now())).await
    }

    async fn insert_customer(&self, customer: Customer) -> ServiceResult<Customer> {
        let mut tx = self.store.begin().await?;
        tx.insert_customer(&customer).await?;
        tx.commit().await?;

        tracing::info!(customer_id = %customer.id, walk_in = customer.is_walk_in, "customer created");
        Ok(customer)
    }

    pub async fn get_customer(&self, customer_id: CustomerId) -> ServiceResult<Customer> {
        let mut tx = self.store.begin().await?;
        found(tx.get_customer(customer_id).await?, || DomainError::CustomerNotFound(customer_id))
    }

    /// Price the lines, number the order and take every line out of stock,
    /// all in one unit of work. Any failing line leaves nothing behind.
    #[tracing::instrument(skip(self))]
    pub async fn create_sales_order(&self, input: NewSalesOrder) -> ServiceResult<SalesOrder> {
        if input.items.is_empty() {
            return Err(DomainError::validation("sales order needs at least one item").into());
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        found(tx.get_customer(input.customer_id).await?, || {
            DomainError::CustomerNotFound(input.customer_id)
        })?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let product = found(tx.get_product(line.product_id).await?, || {
                DomainError::ProductNotFound(line.product_id)
            })?;
            if !product.can_be_sold() {
                return Err(DomainError::validation(format!("product {} is archived", product.sku)).into());
            }
            items.push(SalesOrderItem::new(
                product.id,
                line.quantity_pieces,
                product.price_per_piece,
                product.board_feet()?,
            )?);
        }

        let today = now.date_naive();
        let sequence = tx
            .count_sales_orders_with_prefix(&order_number_prefix(today))
            .await?
            .saturating_add(1);
        let order = SalesOrder::create(
            order_number(today, sequence),
            input.customer_id,
            items,
            input.payment_method,
            input.order_source,
            input.amount_paid,
            input.created_by,
            now,
        )?;
        tx.insert_sales_order(&order).await?;

        for item in &order.items {
            let request = StockRequest::stock_out(item.product_id, item.quantity_pieces, SALE_REASON)
                .with_reference(Some(order.order_number.clone()))
                .created_by(order.created_by);
            ledger::apply_in_tx(tx.as_mut(), &request, now).await?;
        }
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            status = order.status.as_str(),
            "sales order created"
        );
        Ok(order)
    }

    pub async fn get_sales_order(&self, order_id: SalesOrderId) -> ServiceResult<SalesOrder> {
        let mut tx = self.store.begin().await?;
        found(tx.get_sales_order(order_id).await?, || DomainError::OrderNotFound(order_id))
    }

    pub async fn find_by_order_number(&self, order_number: &str) -> ServiceResult<Option<SalesOrder>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_sales_order_by_number(order_number).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal_macros::dec;

    use lumberyard_sales::SalesOrderStatus;

    use crate::services::Services;
    use crate::services::catalog::tests::seed_product;

    use super::*;

    /// One-line order for `quantity` pieces of a freshly stocked product.
    pub(crate) async fn seed_order(services: &Services, quantity: i64) -> SalesOrder {
        let product = seed_product(services, &format!("SKU-{}", ProductId::new())).await;
        services
            .ledger
            .stock_in(product.id, quantity, "Delivery", None, None, None)
            .await
            .unwrap();
        let customer = services
            .sales
            .create_customer(NewCustomer {
                name: "Maria Santos".to_string(),
                email: Some("maria@example.com".to_string()),
                ..NewCustomer::default()
            })
            .await
            .unwrap();
        services
            .sales
            .create_sales_order(NewSalesOrder {
                customer_id: customer.id,
                items: vec![NewOrderLine {
                    product_id: product.id,
                    quantity_pieces: quantity,
                }],
                payment_method: PaymentMethod::Cash,
                order_source: OrderSource::CustomerOrder,
                amount_paid: Decimal::ZERO,
                created_by: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn order_takes_stock_and_numbers_per_day() {
        let services = Services::in_memory();
        let product = seed_product(&services, "PINE-2X4X8").await;
        services.ledger.stock_in(product.id, 50, "Delivery", None, None, None).await.unwrap();
        let customer = services.sales.walk_in_customer("").await.unwrap();
        assert_eq!(customer.name, "Walk-in Customer");

        let new_order = |quantity| NewSalesOrder {
            customer_id: customer.id,
            items: vec![NewOrderLine {
                product_id: product.id,
                quantity_pieces: quantity,
            }],
            payment_method: PaymentMethod::Cash,
            order_source: OrderSource::PointOfSale,
            amount_paid: dec!(500),
            created_by: None,
        };

        let first = services.sales.create_sales_order(new_order(2)).await.unwrap();
        let second = services.sales.create_sales_order(new_order(3)).await.unwrap();

        let prefix = order_number_prefix(Utc::now().date_naive());
        assert_eq!(first.order_number, format!("{prefix}0001"));
        assert_eq!(second.order_number, format!("{prefix}0002"));

        assert_eq!(first.total_amount, dec!(480));
        assert_eq!(first.balance, Decimal::ZERO);
        assert_eq!(first.status, SalesOrderStatus::Paid);
        assert_eq!(second.balance, dec!(220));

        assert_eq!(services.ledger.inventory(product.id).await.unwrap().quantity_pieces, 45);
        let entries = services.ledger.transactions(product.id).await.unwrap();
        assert_eq!(entries[1].reason, SALE_REASON);
        assert_eq!(entries[1].reference_id.as_deref(), Some(first.order_number.as_str()));

        let found = services.sales.find_by_order_number(&second.order_number).await.unwrap();
        assert_eq!(found.map(|o| o.id), Some(second.id));
    }

    #[tokio::test]
    async fn short_line_rolls_back_the_whole_order() {
        let services = Services::in_memory();
        let plenty = seed_product(&services, "PINE-2X4X8").await;
        let scarce = seed_product(&services, "OAK-2X4X8").await;
        services.ledger.stock_in(plenty.id, 10, "Delivery", None, None, None).await.unwrap();
        services.ledger.stock_in(scarce.id, 1, "Delivery", None, None, None).await.unwrap();
        let customer = services.sales.walk_in_customer("Jo").await.unwrap();

        let err = services
            .sales
            .create_sales_order(NewSalesOrder {
                customer_id: customer.id,
                items: vec![
                    NewOrderLine {
                        product_id: plenty.id,
                        quantity_pieces: 5,
                    },
                    NewOrderLine {
                        product_id: scarce.id,
                        quantity_pieces: 2,
                    },
                ],
                payment_method: PaymentMethod::Cod,
                order_source: OrderSource::default(),
                amount_paid: Decimal::ZERO,
                created_by: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_domain(), Some(DomainError::InsufficientStock { .. })));
        assert_eq!(services.ledger.inventory(plenty.id).await.unwrap().quantity_pieces, 10);
        assert_eq!(services.ledger.transactions(plenty.id).await.unwrap().len(), 1);

        let prefix = order_number_prefix(Utc::now().date_naive());
        let none = services.sales.find_by_order_number(&format!("{prefix}0001")).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn unknown_customer_and_archived_product_are_rejected() {
        let services = Services::in_memory();
        let product = seed_product(&services, "PINE-2X4X8").await;
        let line = vec![NewOrderLine {
            product_id: product.id,
            quantity_pieces: 1,
        }];

        let err = services
            .sales
            .create_sales_order(NewSalesOrder {
                customer_id: CustomerId::new(),
                items: line.clone(),
                payment_method: PaymentMethod::Cash,
                order_source: OrderSource::default(),
                amount_paid: Decimal::ZERO,
                created_by: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::CustomerNotFound(_))));

        services.catalog.archive_product(product.id).await.unwrap();
        let customer = services.sales.walk_in_customer("Jo").await.unwrap();
        let err = services
            .sales
            .create_sales_order(NewSalesOrder {
                customer_id: customer.id,
                items: line,
                payment_method: PaymentMethod::Cash,
                order_source: OrderSource::default(),
                amount_paid: Decimal::ZERO,
                created_by: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))));
    }
}
