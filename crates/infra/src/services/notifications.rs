//! Customer notifications: appended by workflow transitions, read by customers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lumberyard_core::{CustomerId, DomainError, NotificationId, SalesOrderId};
use lumberyard_sales::{NotificationContent, NotificationType, OrderNotification};

use super::{ServiceResult, found};
use crate::store::{NotificationQuery, Store, StoreTx};

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    recent_limit: usize,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, recent_limit: usize) -> Self {
        Self { store, recent_limit }
    }

    /// Append a notification. Types that exist once per order go through
    /// [`get_or_create`](Self::get_or_create) instead.
    #[tracing::instrument(skip(self, content))]
    pub async fn notify(
        &self,
        sales_order_id: SalesOrderId,
        customer_id: CustomerId,
        notification_type: NotificationType,
        content: NotificationContent,
    ) -> ServiceResult<OrderNotification> {
        if notification_type.is_unique_per_order() {
            let (notification, _) = self
                .get_or_create(sales_order_id, customer_id, notification_type, content)
                .await?;
            return Ok(notification);
        }

        let mut tx = self.store.begin().await?;
        let notification = notify_in_tx(
            tx.as_mut(),
            sales_order_id,
            customer_id,
            notification_type,
            content,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(notification)
    }

    /// Existing notification of `notification_type` for the order, or a new
    /// one. The flag says whether it was created.
    #[tracing::instrument(skip(self, content))]
    pub async fn get_or_create(
        &self,
        sales_order_id: SalesOrderId,
        customer_id: CustomerId,
        notification_type: NotificationType,
        content: NotificationContent,
    ) -> ServiceResult<(OrderNotification, bool)> {
        let mut tx = self.store.begin().await?;
        let result = get_or_create_in_tx(
            tx.as_mut(),
            sales_order_id,
            customer_id,
            notification_type,
            content,
            Utc::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Flip the read flag. Already-read notifications are returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn mark_as_read(&self, notification_id: NotificationId) -> ServiceResult<OrderNotification> {
        let mut tx = self.store.begin().await?;
        let mut notification = found(tx.lock_notification(notification_id).await?, || {
            DomainError::NotificationNotFound(notification_id)
        })?;
        if notification.mark_as_read(Utc::now()) {
            tx.update_notification(&notification).await?;
            tx.commit().await?;
        }
        Ok(notification)
    }

    /// Mark every unread notification of the customer read; returns how many flipped.
    #[tracing::instrument(skip(self))]
    pub async fn mark_all_as_read(&self, customer_id: CustomerId) -> ServiceResult<usize> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let unread = tx
            .list_notifications(
                customer_id,
                NotificationQuery {
                    unread_only: true,
                    limit: None,
                },
            )
            .await?;

        let mut flipped = 0;
        for mut notification in unread {
            if notification.mark_as_read(now) {
                tx.update_notification(&notification).await?;
                flipped += 1;
            }
        }
        tx.commit().await?;

        tracing::info!(customer_id = %customer_id, count = flipped, "notifications marked read");
        Ok(flipped)
    }

    pub async fn unread_count(&self, customer_id: CustomerId) -> ServiceResult<u64> {
        let mut tx = self.store.begin().await?;
        Ok(tx.count_unread_notifications(customer_id).await?)
    }

    /// Newest first. `limit = None` uses the configured default.
    pub async fn list_recent(
        &self,
        customer_id: CustomerId,
        limit: Option<usize>,
        unread_only: bool,
    ) -> ServiceResult<Vec<OrderNotification>> {
        let mut tx = self.store.begin().await?;
        let query = NotificationQuery {
            unread_only,
            limit: Some(limit.unwrap_or(self.recent_limit)),
        };
        Ok(tx.list_notifications(customer_id, query).await?)
    }
}

pub(crate) async fn notify_in_tx(
    tx: &mut dyn StoreTx,
    sales_order_id: SalesOrderId,
    customer_id: CustomerId,
    notification_type: NotificationType,
    content: NotificationContent,
    now: DateTime<Utc>,
) -> ServiceResult<OrderNotification> {
    let notification = OrderNotification::new(sales_order_id, customer_id, notification_type, content, now);
    tx.insert_notification(&notification).await?;

    tracing::info!(
        order_id = %sales_order_id,
        notification_type = %notification_type,
        "notification created"
    );
    Ok(notification)
}

/// Get-or-create keyed by (order, type). Callers hold the confirmation row
/// lock, so two writers for one order do not race; the store's unique key is
/// the backstop and reports a conflict if they ever do.
pub(crate) async fn get_or_create_in_tx(
    tx: &mut dyn StoreTx,
    sales_order_id: SalesOrderId,
    customer_id: CustomerId,
    notification_type: NotificationType,
    content: NotificationContent,
    now: DateTime<Utc>,
) -> ServiceResult<(OrderNotification, bool)> {
    if let Some(existing) = tx.find_notification(sales_order_id, notification_type).await? {
        return Ok((existing, false));
    }
    let notification = notify_in_tx(tx, sales_order_id, customer_id, notification_type, content, now).await?;
    Ok((notification, true))
}

#[cfg(test)]
mod tests {
    use crate::services::Services;
    use crate::services::sales::tests::seed_order;

    use super::*;

    fn content(order_number: &str) -> NotificationContent {
        NotificationContent::payment_completed(order_number)
    }

    #[tokio::test]
    async fn unique_types_are_created_once() {
        let services = Services::in_memory();
        let order = seed_order(&services, 1).await;
        let notifications = &services.notifications;

        let (first, created) = notifications
            .get_or_create(order.id, order.customer_id, NotificationType::PaymentCompleted, content(&order.order_number))
            .await
            .unwrap();
        assert!(created);

        let again = notifications
            .notify(order.id, order.customer_id, NotificationType::PaymentCompleted, content(&order.order_number))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(notifications.unread_count(order.customer_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_flags_and_recent_listing() {
        let services = Services::in_memory();
        let order = seed_order(&services, 1).await;
        let notifications = &services.notifications;

        for _ in 0..3 {
            notifications
                .notify(
                    order.id,
                    order.customer_id,
                    NotificationType::OrderDelayed,
                    NotificationContent {
                        title: "Delayed".to_string(),
                        message: "Your order is delayed.".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let recent = notifications.list_recent(order.customer_id, Some(2), false).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);

        let read = notifications.mark_as_read(recent[0].id).await.unwrap();
        assert!(read.is_read);
        let read_at = read.read_at;
        let again = notifications.mark_as_read(recent[0].id).await.unwrap();
        assert_eq!(again.read_at, read_at);
        assert_eq!(notifications.unread_count(order.customer_id).await.unwrap(), 2);

        assert_eq!(notifications.mark_all_as_read(order.customer_id).await.unwrap(), 2);
        assert_eq!(notifications.unread_count(order.customer_id).await.unwrap(), 0);
        assert!(notifications.list_recent(order.customer_id, None, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_notification_is_not_found() {
        let services = Services::in_memory();
        let err = services
            .notifications
            .mark_as_read(NotificationId::new())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotificationNotFound(_))));
    }
}
