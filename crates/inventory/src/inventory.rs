use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{DomainResult, Entity, ProductId};
use lumberyard_products::total_board_feet;

/// Stock on hand for one product.
///
/// `total_board_feet` is redundant with `quantity_pieces` and is always
/// `quantity_pieces × board feet per piece`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub product_id: ProductId,
    pub quantity_pieces: i64,
    pub total_board_feet: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Inventory {
    /// Zero-stock row, created alongside its product.
    pub fn empty(product_id: ProductId, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            quantity_pieces: 0,
            total_board_feet: Decimal::ZERO,
            last_updated: now,
        }
    }

    /// Recompute the board-foot total from the piece count.
    ///
    /// Used after a product's dimensions change.
    pub fn recompute_board_feet(&mut self, board_feet_per_piece: Decimal, now: DateTime<Utc>) -> DomainResult<()> {
        self.total_board_feet = total_board_feet(board_feet_per_piece, self.quantity_pieces)?;
        self.last_updated = now;
        Ok(())
    }
}

impl Entity for Inventory {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}
