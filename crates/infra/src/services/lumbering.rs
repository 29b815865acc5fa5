use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{DomainError, DomainResult, ServiceOrderId, UserId};
use lumberyard_lumbering::{
    LumberingOutput, LumberingServiceOrder, NewOutput, NewServiceOrder, NewShavings, ShavingsRecord,
};

use super::{ServiceResult, found};
use crate::store::Store;

/// A service order with everything recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrderDetail {
    pub order: LumberingServiceOrder,
    pub outputs: Vec<LumberingOutput>,
    pub shavings: Vec<ShavingsRecord>,
}

#[derive(Clone)]
pub struct LumberingService {
    store: Arc<dyn Store>,
}

impl LumberingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: NewServiceOrder, created_by: Option<UserId>) -> ServiceResult<LumberingServiceOrder> {
        let customer_id = input.customer_id;
        let order = LumberingServiceOrder::create(input, created_by, Utc::now())?;

        let mut tx = self.store.begin().await?;
        found(tx.get_customer(customer_id).await?, || DomainError::CustomerNotFound(customer_id))?;
        tx.insert_service_order(&order).await?;
        tx.commit().await?;

        tracing::info!(service_order_id = %order.id, wood_type = %order.wood_type, "service order created");
        Ok(order)
    }

    pub async fn get(&self, service_order_id: ServiceOrderId) -> ServiceResult<ServiceOrderDetail> {
        let mut tx = self.store.begin().await?;
        let order = found(tx.get_service_order(service_order_id).await?, || {
            DomainError::ServiceOrderNotFound(service_order_id)
        })?;
        let outputs = tx.list_outputs(service_order_id).await?;
        let shavings = tx.list_shavings(service_order_id).await?;
        Ok(ServiceOrderDetail { order, outputs, shavings })
    }

    #[tracing::instrument(skip(self))]
    pub async fn start(&self, service_order_id: ServiceOrderId) -> ServiceResult<LumberingServiceOrder> {
        self.transition(service_order_id, |order, now| order.start(now)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        service_order_id: ServiceOrderId,
        completed_date: Option<NaiveDate>,
    ) -> ServiceResult<LumberingServiceOrder> {
        self.transition(service_order_id, |order, now| order.complete(completed_date, now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, service_order_id: ServiceOrderId) -> ServiceResult<LumberingServiceOrder> {
        self.transition(service_order_id, |order, now| order.cancel(now)).await
    }

    /// Record milled output and recompute the order's fee in the same unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn record_output(
        &self,
        service_order_id: ServiceOrderId,
        input: NewOutput,
    ) -> ServiceResult<(LumberingOutput, LumberingServiceOrder)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = found(tx.lock_service_order(service_order_id).await?, || {
            DomainError::ServiceOrderNotFound(service_order_id)
        })?;

        let output = LumberingOutput::record(&order, input, now)?;
        tx.insert_output(&output).await?;

        let outputs = tx.list_outputs(service_order_id).await?;
        order.recompute_fee(&outputs, now)?;
        tx.update_service_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            service_order_id = %order.id,
            board_feet = %output.board_feet,
            total_fee = ?order.total_service_fee,
            "lumbering output recorded"
        );
        Ok((output, order))
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_shavings(&self, service_order_id: ServiceOrderId, input: NewShavings) -> ServiceResult<ShavingsRecord> {
        let mut tx = self.store.begin().await?;
        let order = found(tx.lock_service_order(service_order_id).await?, || {
            DomainError::ServiceOrderNotFound(service_order_id)
        })?;

        let record = ShavingsRecord::record(&order, input, Utc::now())?;
        tx.insert_shavings(&record).await?;
        tx.commit().await?;

        tracing::info!(
            service_order_id = %order.id,
            quantity = %record.quantity,
            unit = record.unit.as_str(),
            "shavings recorded"
        );
        Ok(record)
    }

    async fn transition(
        &self,
        service_order_id: ServiceOrderId,
        step: impl FnOnce(&mut LumberingServiceOrder, DateTime<Utc>) -> DomainResult<()>,
    ) -> ServiceResult<LumberingServiceOrder> {
        let mut tx = self.store.begin().await?;
        let mut order = found(tx.lock_service_order(service_order_id).await?, || {
            DomainError::ServiceOrderNotFound(service_order_id)
        })?;

        step(&mut order, Utc::now())?;
        tx.update_service_order(&order).await?;
        tx.commit().await?;

        tracing::info!(service_order_id = %order.id, status = order.status.as_str(), "service order updated");
        Ok(order)
    }
}
