use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{CustomerId, DomainError, DomainResult, Entity, ProductId, SalesOrderId, UserId};
use lumberyard_products::total_board_feet;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Cash on delivery.
    Cod,
    BankTransfer,
    Check,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cod => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cash" => Some(PaymentMethod::Cash),
            "cod" => Some(PaymentMethod::Cod),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "check" => Some(PaymentMethod::Check),
            _ => None,
        }
    }
}

/// Where the order was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    /// Placed ahead of time, picked up later.
    CustomerOrder,
    /// Walk-in sale at the counter.
    #[default]
    PointOfSale,
}

impl OrderSource {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSource::CustomerOrder => "customer_order",
            OrderSource::PointOfSale => "point_of_sale",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer_order" => Some(OrderSource::CustomerOrder),
            "point_of_sale" => Some(OrderSource::PointOfSale),
            _ => None,
        }
    }
}

/// Payment state of a sales order, derived from `amount_paid` vs `total_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    Pending,
    Partial,
    Paid,
}

impl SalesOrderStatus {
    pub fn from_payment(total_amount: Decimal, amount_paid: Decimal) -> Self {
        if amount_paid >= total_amount {
            SalesOrderStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            SalesOrderStatus::Partial
        } else {
            SalesOrderStatus::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SalesOrderStatus::Pending => "pending",
            SalesOrderStatus::Partial => "partial",
            SalesOrderStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SalesOrderStatus::Pending),
            "partial" => Some(SalesOrderStatus::Partial),
            "paid" => Some(SalesOrderStatus::Paid),
            _ => None,
        }
    }
}

/// Order line priced at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub product_id: ProductId,
    pub quantity_pieces: i64,
    pub unit_price: Decimal,
    pub board_feet: Decimal,
    pub subtotal: Decimal,
}

impl SalesOrderItem {
    pub fn new(
        product_id: ProductId,
        quantity_pieces: i64,
        unit_price: Decimal,
        board_feet_per_piece: Decimal,
    ) -> DomainResult<Self> {
        if quantity_pieces <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "line quantity must be positive, got {quantity_pieces}"
            )));
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        let subtotal = unit_price
            .checked_mul(Decimal::from(quantity_pieces))
            .ok_or_else(|| DomainError::invalid_quantity("line subtotal overflows"))?;

        Ok(Self {
            product_id,
            quantity_pieces,
            unit_price,
            board_feet: total_board_feet(board_feet_per_piece, quantity_pieces)?,
            subtotal,
        })
    }
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: SalesOrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub items: Vec<SalesOrderItem>,
    pub payment_method: PaymentMethod,
    pub order_source: OrderSource,
    pub status: SalesOrderStatus,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub balance: Decimal,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl SalesOrder {
    /// Assemble an order from priced lines.
    ///
    /// `balance` never goes below zero; overpayment at the counter is change
    /// handed back, not credit.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        order_number: String,
        customer_id: CustomerId,
        items: Vec<SalesOrderItem>,
        payment_method: PaymentMethod,
        order_source: OrderSource,
        amount_paid: Decimal,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("sales order needs at least one item"));
        }
        if amount_paid < Decimal::ZERO {
            return Err(DomainError::validation("amount paid cannot be negative"));
        }

        let total_amount = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.subtotal))
            .ok_or_else(|| DomainError::invalid_quantity("order total overflows"))?;
        let balance = (total_amount - amount_paid).max(Decimal::ZERO);

        Ok(Self {
            id: SalesOrderId::new(),
            order_number,
            customer_id,
            items,
            payment_method,
            order_source,
            status: SalesOrderStatus::from_payment(total_amount, amount_paid),
            total_amount,
            amount_paid,
            balance,
            created_by,
            created_at: now,
        })
    }

    pub fn total_board_feet(&self) -> Decimal {
        self.items.iter().map(|i| i.board_feet).sum()
    }
}

impl Entity for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `SO-YYYYMMDD-` for the given day.
pub fn order_number_prefix(date: NaiveDate) -> String {
    format!("SO-{}-", date.format("%Y%m%d"))
}

/// `SO-YYYYMMDD-NNNN`; `sequence` is 1-based and counts orders of that day.
pub fn order_number(date: NaiveDate, sequence: u32) -> String {
    format!("{}{:04}", order_number_prefix(date), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_item(quantity: i64, unit_price: Decimal) -> SalesOrderItem {
        SalesOrderItem::new(ProductId::new(), quantity, unit_price, dec!(5.33)).unwrap()
    }

    #[test]
    fn order_numbers_are_zero_padded_per_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(order_number(date, 1), "SO-20260307-0001");
        assert_eq!(order_number(date, 42), "SO-20260307-0042");
        assert!(order_number(date, 7).starts_with(&order_number_prefix(date)));
    }

    #[test]
    fn item_rejects_non_positive_quantity() {
        let err = SalesOrderItem::new(ProductId::new(), 0, dec!(10), dec!(1)).unwrap_err();
        match err {
            DomainError::InvalidQuantity(_) => {}
            _ => panic!("Expected InvalidQuantity"),
        }
    }

    #[test]
    fn item_rejects_overflowing_subtotal() {
        let err = SalesOrderItem::new(ProductId::new(), i64::MAX, Decimal::MAX, dec!(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));

        let err = SalesOrderItem::new(ProductId::new(), i64::MAX, dec!(1), Decimal::MAX).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn totals_and_balance() {
        let order = SalesOrder::create(
            "SO-20260307-0001".to_string(),
            CustomerId::new(),
            vec![test_item(10, dec!(240)), test_item(2, dec!(100.50))],
            PaymentMethod::Cash,
            OrderSource::default(),
            dec!(1000),
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.total_amount, dec!(2601.00));
        assert_eq!(order.balance, dec!(1601.00));
        assert_eq!(order.status, SalesOrderStatus::Partial);
        assert_eq!(order.order_source, OrderSource::PointOfSale);
        assert_eq!(order.total_board_feet(), dec!(63.96));
    }

    #[test]
    fn overpayment_clamps_balance() {
        let order = SalesOrder::create(
            "SO-20260307-0002".to_string(),
            CustomerId::new(),
            vec![test_item(1, dec!(240))],
            PaymentMethod::Cash,
            OrderSource::PointOfSale,
            dec!(500),
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.balance, Decimal::ZERO);
        assert_eq!(order.status, SalesOrderStatus::Paid);
    }

    #[test]
    fn empty_orders_are_rejected() {
        let err = SalesOrder::create(
            "SO-20260307-0003".to_string(),
            CustomerId::new(),
            Vec::new(),
            PaymentMethod::Cod,
            OrderSource::CustomerOrder,
            Decimal::ZERO,
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
