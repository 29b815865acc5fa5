//! Stock ledger: every change to on-hand stock goes through here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use lumberyard_core::{DomainError, ProductId, UserId};
use lumberyard_inventory::{Inventory, StockRequest, StockTransaction, plan_stock_change};

use super::{ServiceResult, found};
use crate::store::{Store, StoreTx};

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Receive `quantity` pieces.
    #[tracing::instrument(skip(self))]
    pub async fn stock_in(
        &self,
        product_id: ProductId,
        quantity: i64,
        reason: &str,
        reference_id: Option<String>,
        cost_per_unit: Option<Decimal>,
        created_by: Option<UserId>,
    ) -> ServiceResult<(Inventory, StockTransaction)> {
        let request = StockRequest::stock_in(product_id, quantity, reason)
            .with_reference(reference_id)
            .with_cost_per_unit(cost_per_unit)
            .created_by(created_by);
        self.record(&request).await
    }

    /// Remove `quantity` pieces; fails with `InsufficientStock` rather than go negative.
    #[tracing::instrument(skip(self))]
    pub async fn stock_out(
        &self,
        product_id: ProductId,
        quantity: i64,
        reason: &str,
        reference_id: Option<String>,
        created_by: Option<UserId>,
    ) -> ServiceResult<(Inventory, StockTransaction)> {
        let request = StockRequest::stock_out(product_id, quantity, reason)
            .with_reference(reference_id)
            .created_by(created_by);
        self.record(&request).await
    }

    /// Apply a signed correction.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        product_id: ProductId,
        quantity_change: i64,
        reason: &str,
        created_by: Option<UserId>,
    ) -> ServiceResult<(Inventory, StockTransaction)> {
        let request = StockRequest::adjustment(product_id, quantity_change, reason).created_by(created_by);
        self.record(&request).await
    }

    /// Apply `request` in its own unit of work.
    pub async fn record(&self, request: &StockRequest) -> ServiceResult<(Inventory, StockTransaction)> {
        let mut tx = self.store.begin().await?;
        let change = match apply_in_tx(tx.as_mut(), request, Utc::now()).await {
            Ok(change) => change,
            Err(e) => {
                tracing::debug!(product_id = %request.product_id, error = %e, "stock change rejected");
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            product_id = %request.product_id,
            transaction_type = %request.transaction_type,
            quantity = change.1.quantity_pieces,
            on_hand = change.0.quantity_pieces,
            "stock recorded"
        );
        Ok(change)
    }

    pub async fn inventory(&self, product_id: ProductId) -> ServiceResult<Inventory> {
        let mut tx = self.store.begin().await?;
        let inventory = tx.get_inventory(product_id).await?;
        found(inventory, || DomainError::ProductNotFound(product_id))
    }

    /// Ledger entries for a product, oldest first.
    pub async fn transactions(&self, product_id: ProductId) -> ServiceResult<Vec<StockTransaction>> {
        let mut tx = self.store.begin().await?;
        found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))?;
        Ok(tx.list_stock_transactions(product_id).await?)
    }
}

/// Lock the inventory row, plan the change, write the row and append the entry.
pub(crate) async fn apply_in_tx(
    tx: &mut dyn StoreTx,
    request: &StockRequest,
    now: DateTime<Utc>,
) -> ServiceResult<(Inventory, StockTransaction)> {
    let product_id = request.product_id;
    let product = found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))?;
    let current = found(tx.lock_inventory(product_id).await?, || DomainError::ProductNotFound(product_id))?;

    let change = plan_stock_change(&current, product.board_feet()?, request, now)?;
    tx.update_inventory(&change.inventory).await?;
    tx.insert_stock_transaction(&change.transaction).await?;

    Ok((change.inventory, change.transaction))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use lumberyard_inventory::TransactionType;

    use crate::services::Services;
    use crate::services::catalog::tests::seed_product;

    use super::*;

    #[tokio::test]
    async fn in_out_in_keeps_a_running_total() {
        let services = Services::in_memory();
        let product = seed_product(&services, "PINE-2X4X8").await;
        let ledger = &services.ledger;

        ledger.stock_in(product.id, 100, "Delivery", None, Some(dec!(120)), None).await.unwrap();
        let (after_out, _) = ledger
            .stock_out(product.id, 30, "Sale", Some("SO-20260101-0001".to_string()), None)
            .await
            .unwrap();
        assert_eq!(after_out.quantity_pieces, 70);

        let (inventory, _) = ledger.stock_in(product.id, 100, "Delivery", None, None, None).await.unwrap();
        assert_eq!(inventory.quantity_pieces, 170);
        assert_eq!(inventory.total_board_feet, dec!(906.10));

        let entries = ledger.transactions(product.id).await.unwrap();
        let deltas: Vec<i64> = entries.iter().map(|t| t.quantity_pieces).collect();
        assert_eq!(deltas, vec![100, -30, 100]);
        assert_eq!(entries[1].transaction_type, TransactionType::StockOut);
        assert_eq!(entries[1].reference_id.as_deref(), Some("SO-20260101-0001"));
    }

    #[tokio::test]
    async fn stock_out_past_zero_changes_nothing() {
        let services = Services::in_memory();
        let product = seed_product(&services, "OAK-1X6X10").await;
        services.ledger.stock_in(product.id, 5, "Delivery", None, None, None).await.unwrap();

        let err = services
            .ledger
            .stock_out(product.id, 6, "Sale", None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::InsufficientStock { available: 5, requested: 6, .. })
        ));

        assert_eq!(services.ledger.inventory(product.id).await.unwrap().quantity_pieces, 5);
        assert_eq!(services.ledger.transactions(product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adjustments_are_signed_and_nonzero() {
        let services = Services::in_memory();
        let product = seed_product(&services, "CEDAR-2X2X4").await;
        services.ledger.stock_in(product.id, 10, "Count", None, None, None).await.unwrap();

        let (inventory, _) = services.ledger.adjust_stock(product.id, -3, "Damaged", None).await.unwrap();
        assert_eq!(inventory.quantity_pieces, 7);

        let err = services.ledger.adjust_stock(product.id, 0, "Noop", None).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidQuantity(_))));

        let err = services.ledger.adjust_stock(product.id, i64::MIN, "Recount", None).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidQuantity(_))));
        assert_eq!(services.ledger.inventory(product.id).await.unwrap().quantity_pieces, 7);
        assert_eq!(services.ledger.transactions(product.id).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stock_outs_never_oversell() {
        let services = Services::in_memory();
        let product = seed_product(&services, "FIR-2X4X12").await;
        services.ledger.stock_in(product.id, 10, "Delivery", None, None, None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let ledger = services.ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.stock_out(product.id, 1, "Counter sale", None, None).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(
                    matches!(e.as_domain(), Some(DomainError::InsufficientStock { .. })),
                    "unexpected error {e:?}"
                ),
            }
        }
        assert_eq!(succeeded, 10);

        let inventory = services.ledger.inventory(product.id).await.unwrap();
        assert_eq!(inventory.quantity_pieces, 0);
        assert_eq!(inventory.total_board_feet, dec!(0.00));

        let entries = services.ledger.transactions(product.id).await.unwrap();
        let stock_outs = entries
            .iter()
            .filter(|t| t.transaction_type == TransactionType::StockOut)
            .count();
        assert_eq!(stock_outs, succeeded);
        assert_eq!(entries.iter().map(|t| t.quantity_pieces).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let services = Services::in_memory();
        let err = services
            .ledger
            .stock_in(ProductId::new(), 1, "Delivery", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::ProductNotFound(_))));
    }
}
