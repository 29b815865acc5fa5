use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{CustomerId, Entity, NotificationId, SalesOrderId};

/// Kind of customer-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderConfirmed,
    ReadyForPickup,
    PaymentPending,
    PaymentCompleted,
    OrderCancelled,
    OrderDelayed,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OrderConfirmed => "order_confirmed",
            NotificationType::ReadyForPickup => "ready_for_pickup",
            NotificationType::PaymentPending => "payment_pending",
            NotificationType::PaymentCompleted => "payment_completed",
            NotificationType::OrderCancelled => "order_cancelled",
            NotificationType::OrderDelayed => "order_delayed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "order_confirmed" => Some(NotificationType::OrderConfirmed),
            "ready_for_pickup" => Some(NotificationType::ReadyForPickup),
            "payment_pending" => Some(NotificationType::PaymentPending),
            "payment_completed" => Some(NotificationType::PaymentCompleted),
            "order_cancelled" => Some(NotificationType::OrderCancelled),
            "order_delayed" => Some(NotificationType::OrderDelayed),
            _ => None,
        }
    }

    /// Types that exist at most once per sales order.
    pub fn is_unique_per_order(self) -> bool {
        matches!(self, NotificationType::PaymentCompleted)
    }
}

impl core::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Title and body of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
}

impl NotificationContent {
    pub fn ready_for_pickup(order_number: &str, is_payment_complete: bool) -> Self {
        let payment = if is_payment_complete {
            "Completed"
        } else {
            "Due on pickup"
        };
        Self {
            title: format!("Your Order {order_number} is Ready for Pickup!"),
            message: format!(
                "Good news! Your order {order_number} is now ready for pickup. \
                 Please come to our store to collect your order. \
                 Payment status: {payment}"
            ),
        }
    }

    pub fn payment_completed(order_number: &str) -> Self {
        Self {
            title: format!("Payment Received for Order {order_number}"),
            message: format!(
                "We've received payment for your order {order_number}. \
                 Your order is ready for pickup!"
            ),
        }
    }

    pub fn order_cancelled(order_number: &str, reason: Option<&str>) -> Self {
        let message = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Your order {order_number} has been cancelled. Reason: {reason}"),
            None => format!("Your order {order_number} has been cancelled."),
        };
        Self {
            title: format!("Order {order_number} Cancelled"),
            message,
        }
    }
}

/// Append-only customer notification. Only the read flag ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub id: NotificationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrderNotification {
    pub fn new(
        sales_order_id: SalesOrderId,
        customer_id: CustomerId,
        notification_type: NotificationType,
        content: NotificationContent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            sales_order_id,
            customer_id,
            notification_type,
            title: content.title,
            message: content.message,
            is_read: false,
            read_at: None,
            created_at: now,
        }
    }

    /// Returns `true` if the flag flipped; an already-read notification keeps its `read_at`.
    pub fn mark_as_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(now);
        true
    }
}

impl Entity for OrderNotification {
    type Id = NotificationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_for_pickup_text_reflects_payment() {
        let due = NotificationContent::ready_for_pickup("SO-20260307-0001", false);
        assert_eq!(due.title, "Your Order SO-20260307-0001 is Ready for Pickup!");
        assert!(due.message.ends_with("Payment status: Due on pickup"));

        let done = NotificationContent::ready_for_pickup("SO-20260307-0001", true);
        assert!(done.message.ends_with("Payment status: Completed"));
        assert!(done.message.starts_with("Good news! Your order SO-20260307-0001 is now ready for pickup. Please come"));
    }

    #[test]
    fn payment_completed_text() {
        let content = NotificationContent::payment_completed("SO-20260307-0001");
        assert_eq!(content.title, "Payment Received for Order SO-20260307-0001");
        assert_eq!(
            content.message,
            "We've received payment for your order SO-20260307-0001. Your order is ready for pickup!"
        );
    }

    #[test]
    fn mark_as_read_is_idempotent() {
        let mut n = OrderNotification::new(
            SalesOrderId::new(),
            CustomerId::new(),
            NotificationType::ReadyForPickup,
            NotificationContent::ready_for_pickup("SO-1", false),
            Utc::now(),
        );
        assert!(!n.is_read);

        assert!(n.mark_as_read(Utc::now()));
        let first = n.read_at;
        assert!(first.is_some());

        assert!(!n.mark_as_read(Utc::now()));
        assert_eq!(n.read_at, first);
    }

    #[test]
    fn only_payment_completed_is_unique() {
        assert!(NotificationType::PaymentCompleted.is_unique_per_order());
        assert!(!NotificationType::ReadyForPickup.is_unique_per_order());
        assert_eq!(NotificationType::parse("order_delayed"), Some(NotificationType::OrderDelayed));
        assert_eq!(NotificationType::parse("bogus"), None);
    }
}
