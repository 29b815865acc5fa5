//! Order confirmation: the post-sale pickup workflow.
//!
//! ```text
//! created ──► confirmed ──► ready_for_pickup ──► picked_up
//!    └────────────────────────► ready_for_pickup
//!
//! created | confirmed | ready_for_pickup ──► cancelled
//! ```
//!
//! Status only moves forward. `picked_up` and `cancelled` are terminal.
//! Payment completion is tracked separately from status and can be recorded
//! at any point.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lumberyard_core::{
    Aggregate, AggregateRoot, ConfirmationId, CustomerId, DomainError, SalesOrderId, UserId,
};
use lumberyard_events::Event;

/// Confirmation status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Created,
    Confirmed,
    ReadyForPickup,
    PickedUp,
    Cancelled,
}

impl ConfirmationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationStatus::Created => "created",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::ReadyForPickup => "ready_for_pickup",
            ConfirmationStatus::PickedUp => "picked_up",
            ConfirmationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(ConfirmationStatus::Created),
            "confirmed" => Some(ConfirmationStatus::Confirmed),
            "ready_for_pickup" => Some(ConfirmationStatus::ReadyForPickup),
            "picked_up" => Some(ConfirmationStatus::PickedUp),
            "cancelled" => Some(ConfirmationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConfirmationStatus::PickedUp | ConfirmationStatus::Cancelled)
    }

    /// Still waiting for the customer to collect.
    pub fn is_pending_pickup(self) -> bool {
        matches!(
            self,
            ConfirmationStatus::Created
                | ConfirmationStatus::Confirmed
                | ConfirmationStatus::ReadyForPickup
        )
    }
}

impl core::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted shape of an [`OrderConfirmation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationSnapshot {
    pub id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub status: ConfirmationStatus,
    pub estimated_pickup_date: Option<NaiveDate>,
    pub actual_pickup_date: Option<NaiveDate>,
    pub is_payment_complete: bool,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: OrderConfirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    id: ConfirmationId,
    sales_order_id: Option<SalesOrderId>,
    customer_id: Option<CustomerId>,
    status: ConfirmationStatus,
    estimated_pickup_date: Option<NaiveDate>,
    actual_pickup_date: Option<NaiveDate>,
    is_payment_complete: bool,
    payment_completed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    picked_up_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    notes: String,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl OrderConfirmation {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ConfirmationId) -> Self {
        Self {
            id,
            sales_order_id: None,
            customer_id: None,
            status: ConfirmationStatus::Created,
            estimated_pickup_date: None,
            actual_pickup_date: None,
            is_payment_complete: false,
            payment_completed_at: None,
            confirmed_at: None,
            ready_at: None,
            picked_up_at: None,
            cancelled_at: None,
            notes: String::new(),
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild from a stored row.
    pub fn restore(s: ConfirmationSnapshot) -> Self {
        Self {
            id: s.id,
            sales_order_id: Some(s.sales_order_id),
            customer_id: Some(s.customer_id),
            status: s.status,
            estimated_pickup_date: s.estimated_pickup_date,
            actual_pickup_date: s.actual_pickup_date,
            is_payment_complete: s.is_payment_complete,
            payment_completed_at: s.payment_completed_at,
            confirmed_at: s.confirmed_at,
            ready_at: s.ready_at,
            picked_up_at: s.picked_up_at,
            cancelled_at: s.cancelled_at,
            notes: s.notes,
            created_by: s.created_by,
            created_at: Some(s.created_at),
            updated_at: Some(s.updated_at),
            version: s.version,
            created: true,
        }
    }

    /// Row to persist. `None` until the aggregate has been created.
    pub fn snapshot(&self) -> Option<ConfirmationSnapshot> {
        if !self.created {
            return None;
        }
        Some(ConfirmationSnapshot {
            id: self.id,
            sales_order_id: self.sales_order_id?,
            customer_id: self.customer_id?,
            status: self.status,
            estimated_pickup_date: self.estimated_pickup_date,
            actual_pickup_date: self.actual_pickup_date,
            is_payment_complete: self.is_payment_complete,
            payment_completed_at: self.payment_completed_at,
            confirmed_at: self.confirmed_at,
            ready_at: self.ready_at,
            picked_up_at: self.picked_up_at,
            cancelled_at: self.cancelled_at,
            notes: self.notes.clone(),
            created_by: self.created_by,
            created_at: self.created_at?,
            updated_at: self.updated_at?,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> ConfirmationId {
        self.id
    }

    pub fn sales_order_id(&self) -> Option<SalesOrderId> {
        self.sales_order_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn status(&self) -> ConfirmationStatus {
        self.status
    }

    pub fn is_payment_complete(&self) -> bool {
        self.is_payment_complete
    }

    pub fn estimated_pickup_date(&self) -> Option<NaiveDate> {
        self.estimated_pickup_date
    }

    pub fn actual_pickup_date(&self) -> Option<NaiveDate> {
        self.actual_pickup_date
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ready_at
    }

    pub fn picked_up_at(&self) -> Option<DateTime<Utc>> {
        self.picked_up_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for OrderConfirmation {
    type Id = ConfirmationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateConfirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConfirmation {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub estimated_pickup_date: Option<NaiveDate>,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub confirmation_id: ConfirmationId,
    /// Replaces the estimated pickup date when given.
    pub estimated_pickup_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReadyForPickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadyForPickup {
    pub confirmation_id: ConfirmationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaymentComplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaymentComplete {
    pub confirmation_id: ConfirmationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPickedUp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPickedUp {
    pub confirmation_id: ConfirmationId,
    /// Defaults to the date of `occurred_at`.
    pub actual_pickup_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelConfirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelConfirmation {
    pub confirmation_id: ConfirmationId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationCommand {
    Create(CreateConfirmation),
    Confirm(ConfirmOrder),
    MarkReadyForPickup(MarkReadyForPickup),
    MarkPaymentComplete(MarkPaymentComplete),
    MarkPickedUp(MarkPickedUp),
    Cancel(CancelConfirmation),
}

/// Event: ConfirmationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationCreated {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub estimated_pickup_date: Option<NaiveDate>,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub confirmation_id: ConfirmationId,
    pub estimated_pickup_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReadyForPickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReadyForPickup {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    /// Payment state at the moment the order became ready.
    pub is_payment_complete: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    /// Status when payment was recorded.
    pub status: ConfirmationStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPickedUp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPickedUp {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub actual_pickup_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ConfirmationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationCancelled {
    pub confirmation_id: ConfirmationId,
    pub sales_order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub previous_status: ConfirmationStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationEvent {
    Created(ConfirmationCreated),
    Confirmed(OrderConfirmed),
    ReadyForPickup(OrderReadyForPickup),
    PaymentCompleted(PaymentCompleted),
    PickedUp(OrderPickedUp),
    Cancelled(ConfirmationCancelled),
}

impl Event for ConfirmationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConfirmationEvent::Created(_) => "sales.confirmation.created",
            ConfirmationEvent::Confirmed(_) => "sales.confirmation.confirmed",
            ConfirmationEvent::ReadyForPickup(_) => "sales.confirmation.ready_for_pickup",
            ConfirmationEvent::PaymentCompleted(_) => "sales.confirmation.payment_completed",
            ConfirmationEvent::PickedUp(_) => "sales.confirmation.picked_up",
            ConfirmationEvent::Cancelled(_) => "sales.confirmation.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ConfirmationEvent::Created(e) => e.occurred_at,
            ConfirmationEvent::Confirmed(e) => e.occurred_at,
            ConfirmationEvent::ReadyForPickup(e) => e.occurred_at,
            ConfirmationEvent::PaymentCompleted(e) => e.occurred_at,
            ConfirmationEvent::PickedUp(e) => e.occurred_at,
            ConfirmationEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for OrderConfirmation {
    type Command = ConfirmationCommand;
    type Event = ConfirmationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ConfirmationEvent::Created(e) => {
                self.id = e.confirmation_id;
                self.sales_order_id = Some(e.sales_order_id);
                self.customer_id = Some(e.customer_id);
                self.status = ConfirmationStatus::Created;
                self.estimated_pickup_date = e.estimated_pickup_date;
                self.notes = e.notes.clone();
                self.created_by = e.created_by;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ConfirmationEvent::Confirmed(e) => {
                self.status = ConfirmationStatus::Confirmed;
                self.confirmed_at = Some(e.occurred_at);
                if e.estimated_pickup_date.is_some() {
                    self.estimated_pickup_date = e.estimated_pickup_date;
                }
            }
            ConfirmationEvent::ReadyForPickup(e) => {
                self.status = ConfirmationStatus::ReadyForPickup;
                self.ready_at = Some(e.occurred_at);
            }
            ConfirmationEvent::PaymentCompleted(e) => {
                self.is_payment_complete = true;
                self.payment_completed_at = Some(e.occurred_at);
            }
            ConfirmationEvent::PickedUp(e) => {
                self.status = ConfirmationStatus::PickedUp;
                self.picked_up_at = Some(e.occurred_at);
                self.actual_pickup_date = Some(e.actual_pickup_date);
            }
            ConfirmationEvent::Cancelled(e) => {
                self.status = ConfirmationStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
        }

        self.updated_at = Some(event.occurred_at());

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ConfirmationCommand::Create(cmd) => self.handle_create(cmd),
            ConfirmationCommand::Confirm(cmd) => self.handle_confirm(cmd),
            ConfirmationCommand::MarkReadyForPickup(cmd) => self.handle_mark_ready(cmd),
            ConfirmationCommand::MarkPaymentComplete(cmd) => self.handle_mark_payment_complete(cmd),
            ConfirmationCommand::MarkPickedUp(cmd) => self.handle_mark_picked_up(cmd),
            ConfirmationCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl OrderConfirmation {
    /// Identity of a created confirmation; errors if it was never created or
    /// the command targets another confirmation.
    fn ensure_target(
        &self,
        confirmation_id: ConfirmationId,
    ) -> Result<(SalesOrderId, CustomerId), DomainError> {
        if !self.created || self.id != confirmation_id {
            return Err(DomainError::confirmation_not_found(confirmation_id));
        }
        match (self.sales_order_id, self.customer_id) {
            (Some(order), Some(customer)) => Ok((order, customer)),
            _ => Err(DomainError::confirmation_not_found(confirmation_id)),
        }
    }

    fn transition_error(&self, requested: ConfirmationStatus) -> DomainError {
        DomainError::invalid_transition(self.status.as_str(), requested.as_str())
    }

    fn handle_create(&self, cmd: &CreateConfirmation) -> Result<Vec<ConfirmationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::DuplicateConfirmation(cmd.sales_order_id));
        }

        Ok(vec![ConfirmationEvent::Created(ConfirmationCreated {
            confirmation_id: cmd.confirmation_id,
            sales_order_id: cmd.sales_order_id,
            customer_id: cmd.customer_id,
            estimated_pickup_date: cmd.estimated_pickup_date,
            notes: cmd.notes.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<ConfirmationEvent>, DomainError> {
        self.ensure_target(cmd.confirmation_id)?;

        if self.status != ConfirmationStatus::Created {
            return Err(self.transition_error(ConfirmationStatus::Confirmed));
        }

        Ok(vec![ConfirmationEvent::Confirmed(OrderConfirmed {
            confirmation_id: cmd.confirmation_id,
            estimated_pickup_date: cmd.estimated_pickup_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_ready(&self, cmd: &MarkReadyForPickup) -> Result<Vec<ConfirmationEvent>, DomainError> {
        let (sales_order_id, customer_id) = self.ensure_target(cmd.confirmation_id)?;

        if !matches!(
            self.status,
            ConfirmationStatus::Created | ConfirmationStatus::Confirmed
        ) {
            return Err(self.transition_error(ConfirmationStatus::ReadyForPickup));
        }

        Ok(vec![ConfirmationEvent::ReadyForPickup(OrderReadyForPickup {
            confirmation_id: cmd.confirmation_id,
            sales_order_id,
            customer_id,
            is_payment_complete: self.is_payment_complete,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_payment_complete(
        &self,
        cmd: &MarkPaymentComplete,
    ) -> Result<Vec<ConfirmationEvent>, DomainError> {
        let (sales_order_id, customer_id) = self.ensure_target(cmd.confirmation_id)?;

        // Allowed from every status, including terminal ones.
        Ok(vec![ConfirmationEvent::PaymentCompleted(PaymentCompleted {
            confirmation_id: cmd.confirmation_id,
            sales_order_id,
            customer_id,
            status: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_picked_up(&self, cmd: &MarkPickedUp) -> Result<Vec<ConfirmationEvent>, DomainError> {
        let (sales_order_id, _) = self.ensure_target(cmd.confirmation_id)?;

        if self.status != ConfirmationStatus::ReadyForPickup {
            return Err(self.transition_error(ConfirmationStatus::PickedUp));
        }

        Ok(vec![ConfirmationEvent::PickedUp(OrderPickedUp {
            confirmation_id: cmd.confirmation_id,
            sales_order_id,
            actual_pickup_date: cmd
                .actual_pickup_date
                .unwrap_or_else(|| cmd.occurred_at.date_naive()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelConfirmation) -> Result<Vec<ConfirmationEvent>, DomainError> {
        let (sales_order_id, customer_id) = self.ensure_target(cmd.confirmation_id)?;

        if self.status.is_terminal() {
            return Err(self.transition_error(ConfirmationStatus::Cancelled));
        }

        Ok(vec![ConfirmationEvent::Cancelled(ConfirmationCancelled {
            confirmation_id: cmd.confirmation_id,
            sales_order_id,
            customer_id,
            previous_status: self.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumberyard_events::execute;

    fn test_confirmation_id() -> ConfirmationId {
        ConfirmationId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created() -> OrderConfirmation {
        let id = test_confirmation_id();
        let mut confirmation = OrderConfirmation::empty(id);
        execute(
            &mut confirmation,
            &ConfirmationCommand::Create(CreateConfirmation {
                confirmation_id: id,
                sales_order_id: SalesOrderId::new(),
                customer_id: CustomerId::new(),
                estimated_pickup_date: None,
                notes: String::new(),
                created_by: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        confirmation
    }

    fn confirm(c: &OrderConfirmation) -> ConfirmationCommand {
        ConfirmationCommand::Confirm(ConfirmOrder {
            confirmation_id: c.id_typed(),
            estimated_pickup_date: None,
            occurred_at: test_time(),
        })
    }

    fn ready(c: &OrderConfirmation) -> ConfirmationCommand {
        ConfirmationCommand::MarkReadyForPickup(MarkReadyForPickup {
            confirmation_id: c.id_typed(),
            occurred_at: test_time(),
        })
    }

    fn paid(c: &OrderConfirmation) -> ConfirmationCommand {
        ConfirmationCommand::MarkPaymentComplete(MarkPaymentComplete {
            confirmation_id: c.id_typed(),
            occurred_at: test_time(),
        })
    }

    fn picked_up(c: &OrderConfirmation) -> ConfirmationCommand {
        ConfirmationCommand::MarkPickedUp(MarkPickedUp {
            confirmation_id: c.id_typed(),
            actual_pickup_date: None,
            occurred_at: test_time(),
        })
    }

    fn cancel(c: &OrderConfirmation) -> ConfirmationCommand {
        ConfirmationCommand::Cancel(CancelConfirmation {
            confirmation_id: c.id_typed(),
            reason: Some("customer request".to_string()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_starts_in_created() {
        let c = created();
        assert!(c.is_created());
        assert_eq!(c.status(), ConfirmationStatus::Created);
        assert!(!c.is_payment_complete());
        assert_eq!(c.version(), 1);
        assert!(c.snapshot().is_some());
    }

    #[test]
    fn create_twice_is_duplicate() {
        let c = created();
        let order_id = c.sales_order_id().unwrap();
        let err = c
            .handle(&ConfirmationCommand::Create(CreateConfirmation {
                confirmation_id: c.id_typed(),
                sales_order_id: order_id,
                customer_id: CustomerId::new(),
                estimated_pickup_date: None,
                notes: String::new(),
                created_by: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateConfirmation(order_id));
    }

    #[test]
    fn full_forward_path() {
        let mut c = created();

        let cmd = confirm(&c);
        execute(&mut c, &cmd).unwrap();
        assert_eq!(c.status(), ConfirmationStatus::Confirmed);

        let cmd = ready(&c);
        let events = execute(&mut c, &cmd).unwrap();
        assert_eq!(c.status(), ConfirmationStatus::ReadyForPickup);
        assert!(c.ready_at().is_some());
        match &events[0] {
            ConfirmationEvent::ReadyForPickup(e) => assert!(!e.is_payment_complete),
            _ => panic!("Expected ReadyForPickup event"),
        }

        let cmd = picked_up(&c);
        execute(&mut c, &cmd).unwrap();
        assert_eq!(c.status(), ConfirmationStatus::PickedUp);
        assert!(c.picked_up_at().is_some());
        assert!(c.actual_pickup_date().is_some());
        assert_eq!(c.version(), 4);
    }

    #[test]
    fn ready_may_skip_confirm() {
        let mut c = created();
        let cmd = ready(&c);
        execute(&mut c, &cmd).unwrap();
        assert_eq!(c.status(), ConfirmationStatus::ReadyForPickup);
    }

    #[test]
    fn picked_up_from_created_is_invalid_and_leaves_state() {
        let mut c = created();
        let before = c.clone();

        let cmd = picked_up(&c);
        let err = execute(&mut c, &cmd).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                current: "created",
                requested: "picked_up",
            }
        );
        assert_eq!(c, before);
    }

    #[test]
    fn ready_twice_is_invalid() {
        let mut c = created();
        let cmd = ready(&c);
        execute(&mut c, &cmd).unwrap();

        let err = c.handle(&ready(&c)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                current: "ready_for_pickup",
                requested: "ready_for_pickup",
            }
        );
    }

    #[test]
    fn confirm_after_ready_is_backwards() {
        let mut c = created();
        let cmd = ready(&c);
        execute(&mut c, &cmd).unwrap();

        match c.handle(&confirm(&c)).unwrap_err() {
            DomainError::InvalidTransition { current, requested } => {
                assert_eq!(current, "ready_for_pickup");
                assert_eq!(requested, "confirmed");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn confirm_can_replace_estimated_pickup_date() {
        let mut c = created();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let cmd = ConfirmationCommand::Confirm(ConfirmOrder {
            confirmation_id: c.id_typed(),
            estimated_pickup_date: Some(date),
            occurred_at: test_time(),
        });
        execute(&mut c, &cmd).unwrap();
        assert_eq!(c.estimated_pickup_date(), Some(date));
    }

    #[test]
    fn payment_is_independent_of_status() {
        let mut c = created();
        let cmd = paid(&c);
        let events = execute(&mut c, &cmd).unwrap();
        assert!(c.is_payment_complete());
        assert_eq!(c.status(), ConfirmationStatus::Created);
        match &events[0] {
            ConfirmationEvent::PaymentCompleted(e) => {
                assert_eq!(e.status, ConfirmationStatus::Created)
            }
            _ => panic!("Expected PaymentCompleted event"),
        }

        let cmd = ready(&c);
        let events = execute(&mut c, &cmd).unwrap();
        match &events[0] {
            ConfirmationEvent::ReadyForPickup(e) => assert!(e.is_payment_complete),
            _ => panic!("Expected ReadyForPickup event"),
        }

        // Repeatable.
        let cmd = paid(&c);
        let events = execute(&mut c, &cmd).unwrap();
        match &events[0] {
            ConfirmationEvent::PaymentCompleted(e) => {
                assert_eq!(e.status, ConfirmationStatus::ReadyForPickup)
            }
            _ => panic!("Expected PaymentCompleted event"),
        }
    }

    #[test]
    fn cancel_from_every_non_terminal_state() {
        let mut from_created = created();
        let cmd = cancel(&from_created);
        execute(&mut from_created, &cmd).unwrap();
        assert_eq!(from_created.status(), ConfirmationStatus::Cancelled);

        let mut from_ready = created();
        let cmd = ready(&from_ready);
        execute(&mut from_ready, &cmd).unwrap();
        let cmd = cancel(&from_ready);
        let events = execute(&mut from_ready, &cmd).unwrap();
        match &events[0] {
            ConfirmationEvent::Cancelled(e) => {
                assert_eq!(e.previous_status, ConfirmationStatus::ReadyForPickup)
            }
            _ => panic!("Expected Cancelled event"),
        }
    }

    #[test]
    fn terminal_states_refuse_everything_but_payment() {
        let mut c = created();
        let cmd = cancel(&c);
        execute(&mut c, &cmd).unwrap();

        for cmd in [confirm(&c), ready(&c), picked_up(&c), cancel(&c)] {
            match c.handle(&cmd).unwrap_err() {
                DomainError::InvalidTransition { current, .. } => assert_eq!(current, "cancelled"),
                other => panic!("Expected InvalidTransition, got {other:?}"),
            }
        }
        assert!(c.handle(&paid(&c)).is_ok());
    }

    #[test]
    fn commands_on_empty_aggregate_are_not_found() {
        let c = OrderConfirmation::empty(test_confirmation_id());
        let err = c.handle(&ready(&c)).unwrap_err();
        assert!(matches!(err, DomainError::ConfirmationNotFound(_)));
    }

    #[test]
    fn snapshot_restores_identically() {
        let mut c = created();
        let cmd = confirm(&c);
        execute(&mut c, &cmd).unwrap();

        let restored = OrderConfirmation::restore(c.snapshot().unwrap());
        assert_eq!(restored, c);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let c = created();
        let before = c.clone();
        let _ = c.handle(&ready(&c)).unwrap();
        assert_eq!(c, before);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn rank(status: ConfirmationStatus) -> u8 {
            match status {
                ConfirmationStatus::Created => 0,
                ConfirmationStatus::Confirmed => 1,
                ConfirmationStatus::ReadyForPickup => 2,
                ConfirmationStatus::PickedUp | ConfirmationStatus::Cancelled => 3,
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: status never moves backwards and terminal states stay put.
            #[test]
            fn status_is_monotonic(ops in proptest::collection::vec(0u8..5, 0..20)) {
                let mut c = created();

                for op in ops {
                    let cmd = match op {
                        0 => confirm(&c),
                        1 => ready(&c),
                        2 => paid(&c),
                        3 => picked_up(&c),
                        _ => cancel(&c),
                    };
                    let before = c.status();
                    let version = c.version();

                    match execute(&mut c, &cmd) {
                        Ok(events) => {
                            prop_assert_eq!(c.version(), version + events.len() as u64);
                            prop_assert!(rank(c.status()) >= rank(before));
                            if before.is_terminal() {
                                prop_assert_eq!(c.status(), before);
                            }
                        }
                        Err(DomainError::InvalidTransition { current, .. }) => {
                            prop_assert_eq!(current, before.as_str());
                            prop_assert_eq!(c.status(), before);
                            prop_assert_eq!(c.version(), version);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                    }
                }
            }
        }
    }
}
