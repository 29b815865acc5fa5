use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{Entity, ProductId, StockTransactionId, UserId};

/// Kind of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Always positive.
    StockIn,
    /// Always negative.
    StockOut,
    /// Either sign.
    Adjustment,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::StockIn => "stock_in",
            TransactionType::StockOut => "stock_out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stock_in" => Some(TransactionType::StockIn),
            "stock_out" => Some(TransactionType::StockOut),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable, append-only ledger entry.
///
/// `quantity_pieces` and `board_feet` are signed deltas: replaying every
/// transaction of a product yields its current inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: StockTransactionId,
    pub product_id: ProductId,
    pub transaction_type: TransactionType,
    pub quantity_pieces: i64,
    pub board_feet: Decimal,
    pub reason: String,
    pub reference_id: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for StockTransaction {
    type Id = StockTransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
