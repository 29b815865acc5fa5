//! Pure stock-change planning.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{DomainError, DomainResult, ProductId, StockTransactionId, UserId};
use lumberyard_products::total_board_feet;

use crate::{Inventory, StockTransaction, TransactionType};

/// A requested stock movement.
///
/// For `StockIn`/`StockOut`, `quantity` is the (positive) number of pieces
/// moved. For `Adjustment` it is the signed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub reason: String,
    pub reference_id: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    pub created_by: Option<UserId>,
}

impl StockRequest {
    pub fn stock_in(product_id: ProductId, quantity: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, TransactionType::StockIn, quantity, reason)
    }

    pub fn stock_out(product_id: ProductId, quantity: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, TransactionType::StockOut, quantity, reason)
    }

    pub fn adjustment(product_id: ProductId, quantity_change: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, TransactionType::Adjustment, quantity_change, reason)
    }

    fn new(
        product_id: ProductId,
        transaction_type: TransactionType,
        quantity: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            transaction_type,
            quantity,
            reason: reason.into(),
            reference_id: None,
            cost_per_unit: None,
            created_by: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn with_cost_per_unit(mut self, cost_per_unit: Option<Decimal>) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }

    pub fn created_by(mut self, user: Option<UserId>) -> Self {
        self.created_by = user;
        self
    }

    /// Signed piece delta this request would apply.
    pub fn signed_delta(&self) -> DomainResult<i64> {
        match self.transaction_type {
            TransactionType::StockIn | TransactionType::StockOut if self.quantity <= 0 => {
                Err(DomainError::invalid_quantity(format!(
                    "{} quantity must be positive, got {}",
                    self.transaction_type, self.quantity
                )))
            }
            TransactionType::StockIn => Ok(self.quantity),
            TransactionType::StockOut => Ok(-self.quantity),
            TransactionType::Adjustment if self.quantity == 0 => Err(DomainError::invalid_quantity(
                "adjustment quantity change cannot be zero",
            )),
            // i64::MIN has no negation to report as a shortfall.
            TransactionType::Adjustment if self.quantity == i64::MIN => Err(DomainError::invalid_quantity(
                format!("adjustment quantity change {} is out of range", self.quantity),
            )),
            TransactionType::Adjustment => Ok(self.quantity),
        }
    }
}

/// Result of planning a stock movement: the row to write and the entry to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub inventory: Inventory,
    pub transaction: StockTransaction,
}

/// Plan `request` against `current`.
///
/// Fails with `InvalidQuantity` for zero/negative quantities and with
/// `InsufficientStock` if the result would drop below zero. On failure nothing
/// is produced, so there is nothing to roll back.
pub fn plan_stock_change(
    current: &Inventory,
    board_feet_per_piece: Decimal,
    request: &StockRequest,
    now: DateTime<Utc>,
) -> DomainResult<StockChange> {
    if current.product_id != request.product_id {
        return Err(DomainError::validation("inventory row belongs to another product"));
    }

    let delta = request.signed_delta()?;
    let next_quantity = current
        .quantity_pieces
        .checked_add(delta)
        .ok_or_else(|| DomainError::invalid_quantity("quantity overflow"))?;

    if next_quantity < 0 {
        return Err(DomainError::InsufficientStock {
            product_id: request.product_id,
            available: current.quantity_pieces,
            requested: -delta,
        });
    }

    let board_feet_delta = total_board_feet(board_feet_per_piece, delta)?;

    let inventory = Inventory {
        product_id: current.product_id,
        quantity_pieces: next_quantity,
        total_board_feet: total_board_feet(board_feet_per_piece, next_quantity)?,
        last_updated: now,
    };

    let transaction = StockTransaction {
        id: StockTransactionId::new(),
        product_id: request.product_id,
        transaction_type: request.transaction_type,
        quantity_pieces: delta,
        board_feet: board_feet_delta,
        reason: request.reason.clone(),
        reference_id: request.reference_id.clone(),
        cost_per_unit: request.cost_per_unit,
        created_by: request.created_by,
        created_at: now,
    };

    Ok(StockChange {
        inventory,
        transaction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn per_piece() -> Decimal {
        dec!(5.33)
    }

    fn stocked(product_id: ProductId, quantity: i64) -> Inventory {
        let mut inv = Inventory::empty(product_id, Utc::now());
        inv.quantity_pieces = quantity;
        inv.total_board_feet = total_board_feet(per_piece(), quantity).unwrap();
        inv
    }

    #[test]
    fn stock_in_adds_pieces_and_board_feet() {
        let product_id = ProductId::new();
        let inv = Inventory::empty(product_id, Utc::now());

        let change = plan_stock_change(
            &inv,
            per_piece(),
            &StockRequest::stock_in(product_id, 100, "Delivery from mill"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(change.inventory.quantity_pieces, 100);
        assert_eq!(change.inventory.total_board_feet, dec!(533.00));
        assert_eq!(change.transaction.quantity_pieces, 100);
        assert_eq!(change.transaction.board_feet, dec!(533.00));
        assert_eq!(change.transaction.transaction_type, TransactionType::StockIn);
    }

    #[test]
    fn stock_out_records_negative_delta() {
        let product_id = ProductId::new();
        let change = plan_stock_change(
            &stocked(product_id, 100),
            per_piece(),
            &StockRequest::stock_out(product_id, 30, "Sale").with_reference(Some("SO-1".into())),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(change.inventory.quantity_pieces, 70);
        assert_eq!(change.transaction.quantity_pieces, -30);
        assert_eq!(change.transaction.board_feet, dec!(-159.90));
        assert_eq!(change.transaction.reference_id.as_deref(), Some("SO-1"));
    }

    #[test]
    fn stock_out_beyond_available_is_rejected() {
        let product_id = ProductId::new();
        let err = plan_stock_change(
            &stocked(product_id, 70),
            per_piece(),
            &StockRequest::stock_out(product_id, 100, "Sale"),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id,
                available: 70,
                requested: 100,
            }
        );
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let product_id = ProductId::new();
        let inv = stocked(product_id, 10);

        for request in [
            StockRequest::stock_in(product_id, 0, "x"),
            StockRequest::stock_out(product_id, -5, "x"),
            StockRequest::adjustment(product_id, 0, "x"),
        ] {
            let err = plan_stock_change(&inv, per_piece(), &request, Utc::now()).unwrap_err();
            match err {
                DomainError::InvalidQuantity(_) => {}
                other => panic!("Expected InvalidQuantity, got {other:?}"),
            }
        }
    }

    #[test]
    fn negative_adjustment_is_guarded() {
        let product_id = ProductId::new();
        let inv = stocked(product_id, 3);

        let ok = plan_stock_change(
            &inv,
            per_piece(),
            &StockRequest::adjustment(product_id, -3, "Count correction"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ok.inventory.quantity_pieces, 0);
        assert_eq!(ok.inventory.total_board_feet, dec!(0.00));

        let err = plan_stock_change(
            &inv,
            per_piece(),
            &StockRequest::adjustment(product_id, -4, "Count correction"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
    }

    #[test]
    fn extreme_adjustments_are_invalid_not_panicking() {
        let product_id = ProductId::new();
        let inv = stocked(product_id, 3);

        let err = plan_stock_change(
            &inv,
            per_piece(),
            &StockRequest::adjustment(product_id, i64::MIN, "Recount"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));

        let err = plan_stock_change(
            &inv,
            per_piece(),
            &StockRequest::adjustment(product_id, i64::MIN + 1, "Recount"),
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, 3);
                assert_eq!(requested, i64::MAX);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn request(product_id: ProductId) -> impl Strategy<Value = StockRequest> {
            prop_oneof![
                (-5i64..200).prop_map(move |q| StockRequest::stock_in(product_id, q, "in")),
                (-5i64..200).prop_map(move |q| StockRequest::stock_out(product_id, q, "out")),
                (-200i64..200).prop_map(move |q| StockRequest::adjustment(product_id, q, "adj")),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: replaying committed deltas yields the inventory, which never goes negative.
            #[test]
            fn replay_matches_inventory(ops in proptest::collection::vec(request(ProductId::from_uuid(uuid_for_tests())), 0..60)) {
                let product_id = ProductId::from_uuid(uuid_for_tests());
                let mut inv = Inventory::empty(product_id, Utc::now());
                let mut log: Vec<StockTransaction> = Vec::new();

                for op in &ops {
                    match plan_stock_change(&inv, per_piece(), op, Utc::now()) {
                        Ok(change) => {
                            inv = change.inventory;
                            log.push(change.transaction);
                        }
                        Err(DomainError::InvalidQuantity(_)) | Err(DomainError::InsufficientStock { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                    prop_assert!(inv.quantity_pieces >= 0);
                }

                let replayed: i64 = log.iter().map(|t| t.quantity_pieces).sum();
                let replayed_bf: Decimal = log.iter().map(|t| t.board_feet).sum();
                prop_assert_eq!(inv.quantity_pieces, replayed);
                prop_assert_eq!(inv.total_board_feet, replayed_bf);
                prop_assert_eq!(inv.total_board_feet, total_board_feet(per_piece(), inv.quantity_pieces).unwrap());
            }
        }

        fn uuid_for_tests() -> uuid::Uuid {
            uuid::Uuid::from_u128(0x0190_0000_0000_7000_8000_0000_0000_0001)
        }
    }
}
