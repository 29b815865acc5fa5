//! `lumberyard-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error taxonomy, and the aggregate/entity traits
//! the business crates build on.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    CategoryId, ConfirmationId, CustomerId, DeliveryId, NotificationId, ProductId, SalesOrderId,
    ServiceOrderId, ServiceOutputId, ShavingsRecordId, StockTransactionId, UserId,
};
