//! Sales domain module.
//!
//! Customers, sales orders, and the post-sale workflow: the order-confirmation
//! state machine, customer notifications, and the delivery hand-off. Pure
//! domain logic only; persistence and side-effect orchestration live in
//! `lumberyard-infra`.

pub mod confirmation;
pub mod customer;
pub mod delivery;
pub mod notification;
pub mod order;

pub use confirmation::{
    CancelConfirmation, ConfirmOrder, ConfirmationCancelled, ConfirmationCommand,
    ConfirmationCreated, ConfirmationEvent, ConfirmationSnapshot, ConfirmationStatus,
    CreateConfirmation, MarkPaymentComplete, MarkPickedUp, MarkReadyForPickup, OrderConfirmation,
    OrderConfirmed, OrderPickedUp, OrderReadyForPickup, PaymentCompleted,
};
pub use customer::{Customer, NewCustomer};
pub use delivery::{Delivery, DeliveryStatus, delivery_number_for};
pub use notification::{NotificationContent, NotificationType, OrderNotification};
pub use order::{
    OrderSource, PaymentMethod, SalesOrder, SalesOrderItem, SalesOrderStatus, order_number,
    order_number_prefix,
};
