//! Domain error model.

use thiserror::Error;

use crate::id::{
    ConfirmationId, CustomerId, NotificationId, ProductId, SalesOrderId, ServiceOrderId,
};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is recoverable by the caller and maps to a 4xx-style outcome
/// at the API boundary. Storage and cache failures are infrastructure concerns
/// and live in `lumberyard-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("sales order {0} not found")]
    OrderNotFound(SalesOrderId),

    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A stock-out or negative adjustment would take stock below zero.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("sales order {0} already has an order confirmation")]
    DuplicateConfirmation(SalesOrderId),

    /// A state machine was asked to move somewhere it cannot go from here.
    #[error("invalid transition from '{current}' to '{requested}'")]
    InvalidTransition {
        current: &'static str,
        requested: &'static str,
    },

    #[error("order confirmation not found: {0}")]
    ConfirmationNotFound(String),

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error("lumbering service order {0} not found")]
    ServiceOrderNotFound(ServiceOrderId),

    /// A value failed validation (e.g. malformed input, duplicate SKU).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_transition(current: &'static str, requested: &'static str) -> Self {
        Self::InvalidTransition { current, requested }
    }

    pub fn confirmation_not_found(id: ConfirmationId) -> Self {
        Self::ConfirmationNotFound(format!("id {id}"))
    }

    pub fn confirmation_not_found_for_order(order_id: SalesOrderId) -> Self {
        Self::ConfirmationNotFound(format!("sales order {order_id}"))
    }

    /// True for the `*NotFound` family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProductNotFound(_)
                | Self::OrderNotFound(_)
                | Self::CustomerNotFound(_)
                | Self::ConfirmationNotFound(_)
                | Self::NotificationNotFound(_)
                | Self::ServiceOrderNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let err = DomainError::invalid_transition("created", "picked_up");
        assert_eq!(
            err.to_string(),
            "invalid transition from 'created' to 'picked_up'"
        );
    }

    #[test]
    fn not_found_family_is_classified() {
        assert!(DomainError::ProductNotFound(ProductId::new()).is_not_found());
        assert!(DomainError::confirmation_not_found_for_order(SalesOrderId::new()).is_not_found());
        assert!(!DomainError::validation("x").is_not_found());
        assert!(!DomainError::DuplicateConfirmation(SalesOrderId::new()).is_not_found());
    }
}
