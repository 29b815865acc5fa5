//! Order-confirmation workflow.
//!
//! Each operation locks the confirmation row, lets the aggregate decide,
//! writes the new snapshot and then acts on the emitted events, all in the
//! same unit of work:
//!
//! | event               | side effect                                              |
//! |---------------------|----------------------------------------------------------|
//! | `ReadyForPickup`    | `ready_for_pickup` notification, get-or-create delivery   |
//! | `PaymentCompleted`  | get-or-create `payment_completed` notification if ready |
//! | `PickedUp`          | delivery marked delivered (missing delivery tolerated)   |
//! | `Cancelled`         | `order_cancelled` notification                           |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{ConfirmationId, CustomerId, DomainError, SalesOrderId, UserId};
use lumberyard_events::{Event, execute};
use lumberyard_sales::{
    CancelConfirmation, ConfirmOrder, ConfirmationCommand, ConfirmationEvent, ConfirmationSnapshot,
    ConfirmationStatus, CreateConfirmation, MarkPaymentComplete, MarkPickedUp, MarkReadyForPickup,
    NotificationContent, NotificationType, OrderConfirmation, SalesOrder,
};

use super::{ServiceError, ServiceResult, delivery, found, notifications};
use crate::store::{Store, StoreError, StoreTx};

/// Input of [`ConfirmationService::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConfirmation {
    pub sales_order_id: SalesOrderId,
    #[serde(default)]
    pub estimated_pickup_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

const PENDING_PICKUP: [ConfirmationStatus; 3] = [
    ConfirmationStatus::Created,
    ConfirmationStatus::Confirmed,
    ConfirmationStatus::ReadyForPickup,
];

const NOT_YET_READY: [ConfirmationStatus; 2] = [ConfirmationStatus::Created, ConfirmationStatus::Confirmed];

#[derive(Clone)]
pub struct ConfirmationService {
    store: Arc<dyn Store>,
}

impl ConfirmationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open the confirmation of a sales order. One per order.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: NewConfirmation) -> ServiceResult<ConfirmationSnapshot> {
        let order_id = input.sales_order_id;
        let mut tx = self.store.begin().await?;
        let order = found(tx.get_sales_order(order_id).await?, || DomainError::OrderNotFound(order_id))?;
        if tx.find_confirmation_by_order(order_id).await?.is_some() {
            return Err(DomainError::DuplicateConfirmation(order_id).into());
        }

        let confirmation_id = ConfirmationId::new();
        let mut confirmation = OrderConfirmation::empty(confirmation_id);
        execute(
            &mut confirmation,
            &ConfirmationCommand::Create(CreateConfirmation {
                confirmation_id,
                sales_order_id: order.id,
                customer_id: order.customer_id,
                estimated_pickup_date: input.estimated_pickup_date,
                notes: input.notes,
                created_by: input.created_by,
                occurred_at: Utc::now(),
            }),
        )?;
        let snapshot = found(confirmation.snapshot(), || DomainError::confirmation_not_found(confirmation_id))?;

        match tx.insert_confirmation(&snapshot).await {
            Err(StoreError::Conflict(_)) => return Err(DomainError::DuplicateConfirmation(order_id).into()),
            other => other?,
        }
        tx.commit().await?;

        tracing::info!(
            confirmation_id = %snapshot.id,
            order_id = %order_id,
            status = snapshot.status.as_str(),
            "order confirmation created"
        );
        Ok(snapshot)
    }

    /// created → confirmed, optionally moving the estimated pickup date.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        confirmation_id: ConfirmationId,
        estimated_pickup_date: Option<NaiveDate>,
    ) -> ServiceResult<ConfirmationSnapshot> {
        self.run(confirmation_id, |occurred_at| {
            ConfirmationCommand::Confirm(ConfirmOrder {
                confirmation_id,
                estimated_pickup_date,
                occurred_at,
            })
        })
        .await
    }

    /// {created, confirmed} → ready_for_pickup. Notifies the customer and
    /// opens the delivery.
    #[tracing::instrument(skip(self))]
    pub async fn mark_ready_for_pickup(&self, confirmation_id: ConfirmationId) -> ServiceResult<ConfirmationSnapshot> {
        self.run(confirmation_id, |occurred_at| {
            ConfirmationCommand::MarkReadyForPickup(MarkReadyForPickup {
                confirmation_id,
                occurred_at,
            })
        })
        .await
    }

    /// Record payment, whatever the status. Once ready, the customer gets a
    /// single `payment_completed` notification however often this is called.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_complete(&self, confirmation_id: ConfirmationId) -> ServiceResult<ConfirmationSnapshot> {
        self.run(confirmation_id, |occurred_at| {
            ConfirmationCommand::MarkPaymentComplete(MarkPaymentComplete {
                confirmation_id,
                occurred_at,
            })
        })
        .await
    }

    /// ready_for_pickup → picked_up. Closes the delivery if there is one.
    #[tracing::instrument(skip(self))]
    pub async fn mark_picked_up(
        &self,
        confirmation_id: ConfirmationId,
        actual_pickup_date: Option<NaiveDate>,
    ) -> ServiceResult<ConfirmationSnapshot> {
        self.run(confirmation_id, |occurred_at| {
            ConfirmationCommand::MarkPickedUp(MarkPickedUp {
                confirmation_id,
                actual_pickup_date,
                occurred_at,
            })
        })
        .await
    }

    /// Any non-terminal status → cancelled. Stock is not returned.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, confirmation_id: ConfirmationId, reason: Option<String>) -> ServiceResult<ConfirmationSnapshot> {
        self.run(confirmation_id, |occurred_at| {
            ConfirmationCommand::Cancel(CancelConfirmation {
                confirmation_id,
                reason,
                occurred_at,
            })
        })
        .await
    }

    pub async fn get(&self, confirmation_id: ConfirmationId) -> ServiceResult<ConfirmationSnapshot> {
        let mut tx = self.store.begin().await?;
        found(tx.get_confirmation(confirmation_id).await?, || {
            DomainError::confirmation_not_found(confirmation_id)
        })
    }

    pub async fn get_by_order(&self, sales_order_id: SalesOrderId) -> ServiceResult<ConfirmationSnapshot> {
        let mut tx = self.store.begin().await?;
        found(tx.find_confirmation_by_order(sales_order_id).await?, || {
            DomainError::confirmation_not_found_for_order(sales_order_id)
        })
    }

    /// The customer's confirmations that are not picked up or cancelled yet, newest first.
    pub async fn pending_pickups(&self, customer_id: CustomerId) -> ServiceResult<Vec<ConfirmationSnapshot>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_confirmations(Some(customer_id), &PENDING_PICKUP).await?)
    }

    /// Mark every created/confirmed confirmation ready, one unit of work each.
    /// Confirmations that moved on in the meantime are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn mark_all_pending_ready(&self) -> ServiceResult<Vec<ConfirmationSnapshot>> {
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.list_confirmations(None, &NOT_YET_READY).await?
        };

        let mut marked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.mark_ready_for_pickup(candidate.id).await {
                Ok(snapshot) => marked.push(snapshot),
                Err(ServiceError::Domain(DomainError::InvalidTransition { current, .. })) => {
                    tracing::debug!(confirmation_id = %candidate.id, current, "skipped, no longer pending");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(count = marked.len(), "pending confirmations marked ready");
        Ok(marked)
    }

    /// Lock, decide, persist, then apply side effects; commit once.
    async fn run(
        &self,
        confirmation_id: ConfirmationId,
        command: impl FnOnce(DateTime<Utc>) -> ConfirmationCommand,
    ) -> ServiceResult<ConfirmationSnapshot> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let current = found(tx.lock_confirmation(confirmation_id).await?, || {
            DomainError::confirmation_not_found(confirmation_id)
        })?;

        let mut confirmation = OrderConfirmation::restore(current);
        let events = match execute(&mut confirmation, &command(now)) {
            Ok(events) => events,
            Err(e) => {
                tracing::debug!(confirmation_id = %confirmation_id, error = %e, "confirmation command rejected");
                return Err(e.into());
            }
        };
        let snapshot = found(confirmation.snapshot(), || DomainError::confirmation_not_found(confirmation_id))?;
        tx.update_confirmation(&snapshot).await?;

        for event in &events {
            tracing::debug!(confirmation_id = %confirmation_id, event = event.event_type(), "applying side effects");
            apply_side_effects(tx.as_mut(), event, now).await?;
        }
        tx.commit().await?;

        tracing::info!(
            confirmation_id = %snapshot.id,
            order_id = %snapshot.sales_order_id,
            status = snapshot.status.as_str(),
            payment_complete = snapshot.is_payment_complete,
            "order confirmation updated"
        );
        Ok(snapshot)
    }
}

async fn apply_side_effects(tx: &mut dyn StoreTx, event: &ConfirmationEvent, now: DateTime<Utc>) -> ServiceResult<()> {
    match event {
        ConfirmationEvent::ReadyForPickup(e) => {
            let order = load_order(tx, e.sales_order_id).await?;
            notifications::notify_in_tx(
                tx,
                order.id,
                e.customer_id,
                NotificationType::ReadyForPickup,
                NotificationContent::ready_for_pickup(&order.order_number, e.is_payment_complete),
                now,
            )
            .await?;
            delivery::open_in_tx(tx, order.id, &order.order_number, now).await?;
        }
        ConfirmationEvent::PaymentCompleted(e) if e.status == ConfirmationStatus::ReadyForPickup => {
            let order = load_order(tx, e.sales_order_id).await?;
            notifications::get_or_create_in_tx(
                tx,
                order.id,
                e.customer_id,
                NotificationType::PaymentCompleted,
                NotificationContent::payment_completed(&order.order_number),
                now,
            )
            .await?;
        }
        ConfirmationEvent::PickedUp(e) => {
            delivery::complete_in_tx(tx, e.sales_order_id, now).await?;
        }
        ConfirmationEvent::Cancelled(e) => {
            let order = load_order(tx, e.sales_order_id).await?;
            notifications::notify_in_tx(
                tx,
                order.id,
                e.customer_id,
                NotificationType::OrderCancelled,
                NotificationContent::order_cancelled(&order.order_number, e.reason.as_deref()),
                now,
            )
            .await?;
        }
        ConfirmationEvent::Created(_) | ConfirmationEvent::Confirmed(_) | ConfirmationEvent::PaymentCompleted(_) => {}
    }
    Ok(())
}

async fn load_order(tx: &mut dyn StoreTx, order_id: SalesOrderId) -> ServiceResult<SalesOrder> {
    found(tx.get_sales_order(order_id).await?, || DomainError::OrderNotFound(order_id))
}

#[cfg(test)]
mod tests {
    use lumberyard_sales::{DeliveryStatus, OrderNotification};

    use crate::services::Services;
    use crate::services::sales::tests::seed_order;

    use super::*;

    async fn created(services: &Services) -> (SalesOrder, ConfirmationSnapshot) {
        let order = seed_order(services, 2).await;
        let confirmation = services
            .confirmations
            .create(NewConfirmation {
                sales_order_id: order.id,
                estimated_pickup_date: None,
                notes: String::new(),
                created_by: None,
            })
            .await
            .unwrap();
        (order, confirmation)
    }

    async fn notifications_of(
        services: &Services,
        customer_id: CustomerId,
        notification_type: NotificationType,
    ) -> Vec<OrderNotification> {
        services
            .notifications
            .list_recent(customer_id, Some(100), false)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == notification_type)
            .collect()
    }

    fn is_invalid_transition(err: &ServiceError, from: &str, to: &str) -> bool {
        matches!(
            err.as_domain(),
            Some(DomainError::InvalidTransition { current, requested }) if *current == from && *requested == to
        )
    }

    #[tokio::test]
    async fn ready_then_picked_up_opens_and_closes_the_delivery() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;
        assert_eq!(confirmation.status, ConfirmationStatus::Created);

        let ready = services.confirmations.mark_ready_for_pickup(confirmation.id).await.unwrap();
        assert_eq!(ready.status, ConfirmationStatus::ReadyForPickup);
        assert!(ready.ready_at.is_some());

        let delivery = services.deliveries.get_by_order(order.id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        let ready_notes = notifications_of(&services, order.customer_id, NotificationType::ReadyForPickup).await;
        assert_eq!(ready_notes.len(), 1);
        assert!(ready_notes[0].title.contains(&order.order_number));

        let picked = services.confirmations.mark_picked_up(confirmation.id, None).await.unwrap();
        assert_eq!(picked.status, ConfirmationStatus::PickedUp);
        assert!(picked.actual_pickup_date.is_some());

        let delivery = services.deliveries.get_by_order(order.id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert!(delivery.delivered_at.is_some());
        assert!(services.deliveries.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pickup_straight_from_created_is_rejected() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;

        let err = services.confirmations.mark_picked_up(confirmation.id, None).await.unwrap_err();
        assert!(is_invalid_transition(&err, "created", "picked_up"));

        let unchanged = services.confirmations.get(confirmation.id).await.unwrap();
        assert_eq!(unchanged, confirmation);
        assert!(services.deliveries.get_by_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_ready_is_rejected_without_a_second_delivery() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;
        services.confirmations.confirm(confirmation.id, None).await.unwrap();
        services.confirmations.mark_ready_for_pickup(confirmation.id).await.unwrap();

        let err = services.confirmations.mark_ready_for_pickup(confirmation.id).await.unwrap_err();
        assert!(is_invalid_transition(&err, "ready_for_pickup", "ready_for_pickup"));

        assert_eq!(services.deliveries.list_pending().await.unwrap().len(), 1);
        let ready_notes = notifications_of(&services, order.customer_id, NotificationType::ReadyForPickup).await;
        assert_eq!(ready_notes.len(), 1);
    }

    #[tokio::test]
    async fn repeated_payment_notifies_once() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;
        services.confirmations.mark_ready_for_pickup(confirmation.id).await.unwrap();

        let first = services.confirmations.mark_payment_complete(confirmation.id).await.unwrap();
        let second = services.confirmations.mark_payment_complete(confirmation.id).await.unwrap();
        assert!(first.is_payment_complete && second.is_payment_complete);

        let paid = notifications_of(&services, order.customer_id, NotificationType::PaymentCompleted).await;
        assert_eq!(paid.len(), 1);
    }

    #[tokio::test]
    async fn payment_before_ready_shows_in_the_ready_notice() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;

        let paid = services.confirmations.mark_payment_complete(confirmation.id).await.unwrap();
        assert!(paid.is_payment_complete);
        assert_eq!(paid.status, ConfirmationStatus::Created);
        assert!(notifications_of(&services, order.customer_id, NotificationType::PaymentCompleted).await.is_empty());

        services.confirmations.mark_ready_for_pickup(confirmation.id).await.unwrap();
        let ready_notes = notifications_of(&services, order.customer_id, NotificationType::ReadyForPickup).await;
        assert!(ready_notes[0].message.contains("Completed"));
    }

    #[tokio::test]
    async fn one_confirmation_per_order() {
        let services = Services::in_memory();
        let (order, _) = created(&services).await;

        let duplicate = NewConfirmation {
            sales_order_id: order.id,
            estimated_pickup_date: None,
            notes: String::new(),
            created_by: None,
        };
        let err = services.confirmations.create(duplicate.clone()).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::DuplicateConfirmation(id)) if *id == order.id));

        let err = services
            .confirmations
            .create(NewConfirmation {
                sales_order_id: SalesOrderId::new(),
                ..duplicate
            })
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn cancel_notifies_and_keeps_stock_sold() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;
        let product_id = order.items[0].product_id;

        let cancelled = services
            .confirmations
            .cancel(confirmation.id, Some("Customer changed plans".to_string()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, ConfirmationStatus::Cancelled);

        let notes = notifications_of(&services, order.customer_id, NotificationType::OrderCancelled).await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("Customer changed plans"));
        assert_eq!(services.ledger.inventory(product_id).await.unwrap().quantity_pieces, 0);

        let err = services.confirmations.cancel(confirmation.id, None).await.unwrap_err();
        assert!(is_invalid_transition(&err, "cancelled", "cancelled"));
    }

    #[tokio::test]
    async fn pending_pickups_and_batch_ready() {
        let services = Services::in_memory();
        let (first_order, first) = created(&services).await;
        let (_, second) = created(&services).await;
        let (_, third) = created(&services).await;
        services.confirmations.mark_ready_for_pickup(second.id).await.unwrap();
        services.confirmations.cancel(third.id, None).await.unwrap();

        let pending = services.confirmations.pending_pickups(first_order.customer_id).await.unwrap();
        assert_eq!(pending.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first.id]);

        let marked = services.confirmations.mark_all_pending_ready().await.unwrap();
        assert_eq!(marked.iter().map(|c| c.id).collect::<Vec<_>>(), vec![first.id]);
        assert_eq!(services.deliveries.list_pending().await.unwrap().len(), 2);
        assert!(services.confirmations.mark_all_pending_ready().await.unwrap().is_empty());

        let by_order = services.confirmations.get_by_order(first_order.id).await.unwrap();
        assert_eq!(by_order.status, ConfirmationStatus::ReadyForPickup);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ready_calls_succeed_once() {
        let services = Services::in_memory();
        let (order, confirmation) = created(&services).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let confirmations = services.confirmations.clone();
                tokio::spawn(async move { confirmations.mark_ready_for_pickup(confirmation.id).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(services.deliveries.list_pending().await.unwrap().len(), 1);
        let ready_notes = notifications_of(&services, order.customer_id, NotificationType::ReadyForPickup).await;
        assert_eq!(ready_notes.len(), 1);
    }
}
