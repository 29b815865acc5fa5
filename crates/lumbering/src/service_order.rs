use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use lumberyard_core::{CustomerId, DomainError, DomainResult, Entity, ServiceOrderId, UserId};

use crate::LumberingOutput;

/// Fee charged per board foot of output unless the order says otherwise.
pub const DEFAULT_FEE_PER_BOARD_FOOT: Decimal = dec!(5.00);

/// Service order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ServiceStatus::Pending),
            "in_progress" => Some(ServiceStatus::InProgress),
            "completed" => Some(ServiceStatus::Completed),
            "cancelled" => Some(ServiceStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Cancelled)
    }
}

/// Who keeps the shavings (palaras).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShavingsOwnership {
    Customer,
    #[default]
    LumberCompany,
    /// 50/50.
    Shared,
}

impl ShavingsOwnership {
    pub fn as_str(self) -> &'static str {
        match self {
            ShavingsOwnership::Customer => "customer",
            ShavingsOwnership::LumberCompany => "lumber_company",
            ShavingsOwnership::Shared => "shared",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "customer" => Some(ShavingsOwnership::Customer),
            "lumber_company" => Some(ShavingsOwnership::LumberCompany),
            "shared" => Some(ShavingsOwnership::Shared),
            _ => None,
        }
    }
}

/// Customer-owned wood received for milling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LumberingServiceOrder {
    pub id: ServiceOrderId,
    pub customer_id: CustomerId,
    pub received_date: NaiveDate,
    pub completed_date: Option<NaiveDate>,
    pub status: ServiceStatus,
    pub wood_type: String,
    pub quantity_logs: i64,
    pub estimated_board_feet: Option<Decimal>,
    pub service_fee_per_bf: Decimal,
    /// `None` until the first output is recorded.
    pub total_service_fee: Option<Decimal>,
    pub shavings_ownership: ShavingsOwnership,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServiceOrder {
    pub customer_id: CustomerId,
    /// Defaults to today.
    #[serde(default)]
    pub received_date: Option<NaiveDate>,
    pub wood_type: String,
    pub quantity_logs: i64,
    #[serde(default)]
    pub estimated_board_feet: Option<Decimal>,
    /// Defaults to [`DEFAULT_FEE_PER_BOARD_FOOT`].
    #[serde(default)]
    pub service_fee_per_bf: Option<Decimal>,
    #[serde(default)]
    pub shavings_ownership: ShavingsOwnership,
    #[serde(default)]
    pub notes: String,
}

impl LumberingServiceOrder {
    pub fn create(input: NewServiceOrder, created_by: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        let wood_type = input.wood_type.trim();
        if wood_type.is_empty() {
            return Err(DomainError::validation("wood type cannot be empty"));
        }
        if input.quantity_logs < 1 {
            return Err(DomainError::invalid_quantity(format!(
                "log count must be at least 1, got {}",
                input.quantity_logs
            )));
        }
        if let Some(estimate) = input.estimated_board_feet {
            if estimate <= Decimal::ZERO {
                return Err(DomainError::validation("estimated board feet must be positive"));
            }
        }
        let fee = input.service_fee_per_bf.unwrap_or(DEFAULT_FEE_PER_BOARD_FOOT);
        if fee <= Decimal::ZERO {
            return Err(DomainError::validation("service fee per board foot must be positive"));
        }

        Ok(Self {
            id: ServiceOrderId::new(),
            customer_id: input.customer_id,
            received_date: input.received_date.unwrap_or_else(|| now.date_naive()),
            completed_date: None,
            status: ServiceStatus::Pending,
            wood_type: wood_type.to_string(),
            quantity_logs: input.quantity_logs,
            estimated_board_feet: input.estimated_board_feet,
            service_fee_per_bf: fee,
            total_service_fee: None,
            shavings_ownership: input.shavings_ownership,
            notes: input.notes,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// pending → in_progress.
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != ServiceStatus::Pending {
            return Err(self.transition_error(ServiceStatus::InProgress));
        }
        self.status = ServiceStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    /// in_progress → completed.
    pub fn complete(&mut self, completed_date: Option<NaiveDate>, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != ServiceStatus::InProgress {
            return Err(self.transition_error(ServiceStatus::Completed));
        }
        self.status = ServiceStatus::Completed;
        self.completed_date = Some(completed_date.unwrap_or_else(|| now.date_naive()));
        self.updated_at = now;
        Ok(())
    }

    /// Any non-terminal status → cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error(ServiceStatus::Cancelled));
        }
        self.status = ServiceStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Outputs can be recorded until the order is completed or cancelled.
    pub fn ensure_accepts_output(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "service order {} is {} and no longer accepts output",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// `Σ output board feet × fee per board foot`, or `None` without output.
    pub fn recompute_fee(&mut self, outputs: &[LumberingOutput], now: DateTime<Utc>) -> DomainResult<Option<Decimal>> {
        let overflow = || DomainError::invalid_quantity("service fee overflows");
        let total_bf = outputs
            .iter()
            .filter(|o| o.service_order_id == self.id)
            .try_fold(Decimal::ZERO, |acc, o| acc.checked_add(o.board_feet))
            .ok_or_else(overflow)?;

        self.total_service_fee = if total_bf > Decimal::ZERO {
            let fee = total_bf.checked_mul(self.service_fee_per_bf).ok_or_else(overflow)?;
            Some(fee.round_dp(2))
        } else {
            None
        };
        self.updated_at = now;
        Ok(self.total_service_fee)
    }

    fn transition_error(&self, requested: ServiceStatus) -> DomainError {
        DomainError::invalid_transition(self.status.as_str(), requested.as_str())
    }
}

impl Entity for LumberingServiceOrder {
    type Id = ServiceOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
