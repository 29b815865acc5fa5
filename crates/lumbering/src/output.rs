use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{DomainError, DomainResult, Entity, ServiceOrderId, ServiceOutputId};
use lumberyard_products::lot_board_feet;

use crate::LumberingServiceOrder;

/// Quality grade of milled lumber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LumberGrade {
    Select,
    #[default]
    Common1,
    Common2,
    Common3,
}

impl LumberGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            LumberGrade::Select => "select",
            LumberGrade::Common1 => "common1",
            LumberGrade::Common2 => "common2",
            LumberGrade::Common3 => "common3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "select" => Some(LumberGrade::Select),
            "common1" => Some(LumberGrade::Common1),
            "common2" => Some(LumberGrade::Common2),
            "common3" => Some(LumberGrade::Common3),
            _ => None,
        }
    }
}

/// Lumber milled from a customer's logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LumberingOutput {
    pub id: ServiceOutputId,
    pub service_order_id: ServiceOrderId,
    pub lumber_type: String,
    pub quantity_pieces: i64,
    pub length_ft: Decimal,
    pub width_in: Decimal,
    pub thickness_in: Decimal,
    pub board_feet: Decimal,
    pub grade: LumberGrade,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutput {
    pub lumber_type: String,
    pub quantity_pieces: i64,
    pub length_ft: Decimal,
    pub width_in: Decimal,
    pub thickness_in: Decimal,
    #[serde(default)]
    pub grade: LumberGrade,
    #[serde(default)]
    pub notes: String,
}

impl LumberingOutput {
    /// Validate and measure an output lot for `order`.
    ///
    /// The order's fee is not touched here; callers recompute it with
    /// [`LumberingServiceOrder::recompute_fee`] in the same unit of work.
    pub fn record(order: &LumberingServiceOrder, input: NewOutput, now: DateTime<Utc>) -> DomainResult<Self> {
        order.ensure_accepts_output()?;

        let lumber_type = input.lumber_type.trim();
        if lumber_type.is_empty() {
            return Err(DomainError::validation("lumber type cannot be empty"));
        }
        if input.quantity_pieces < 1 {
            return Err(DomainError::invalid_quantity(format!(
                "output pieces must be at least 1, got {}",
                input.quantity_pieces
            )));
        }
        if input.length_ft <= Decimal::ZERO
            || input.width_in <= Decimal::ZERO
            || input.thickness_in <= Decimal::ZERO
        {
            return Err(DomainError::validation("output dimensions must be positive"));
        }

        let board_feet = lot_board_feet(
            input.thickness_in,
            input.width_in,
            input.length_ft,
            input.quantity_pieces,
        )?;

        Ok(Self {
            id: ServiceOutputId::new(),
            service_order_id: order.id,
            lumber_type: lumber_type.to_string(),
            quantity_pieces: input.quantity_pieces,
            length_ft: input.length_ft,
            width_in: input.width_in,
            thickness_in: input.thickness_in,
            board_feet,
            grade: input.grade,
            notes: input.notes,
            recorded_at: now,
        })
    }
}

impl Entity for LumberingOutput {
    type Id = ServiceOutputId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
