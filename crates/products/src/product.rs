use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lumberyard_core::{CategoryId, DomainError, DomainResult, Entity, ProductId};

use crate::board_feet::board_feet_per_piece;

/// Nominal dimensions of one piece of lumber.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub thickness_in: Decimal,
    pub width_in: Decimal,
    pub length_ft: Decimal,
}

impl Dimensions {
    pub fn new(thickness_in: Decimal, width_in: Decimal, length_ft: Decimal) -> DomainResult<Self> {
        let dims = Self {
            thickness_in,
            width_in,
            length_ft,
        };
        dims.validate()?;
        Ok(dims)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.thickness_in <= Decimal::ZERO
            || self.width_in <= Decimal::ZERO
            || self.length_ft <= Decimal::ZERO
        {
            return Err(DomainError::validation("dimensions must be positive"));
        }
        self.board_feet().map(|_| ())
    }

    /// Board feet of a single piece.
    pub fn board_feet(&self) -> DomainResult<Decimal> {
        board_feet_per_piece(self.thickness_in, self.width_in, self.length_ft)
    }
}

/// A lumber product in the catalogue.
///
/// Products are never hard-deleted: archiving clears `is_active` and keeps the
/// inventory row and the stock-transaction history intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category_id: CategoryId,
    pub dimensions: Dimensions,
    pub price_per_board_foot: Decimal,
    pub price_per_piece: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category_id: CategoryId,
    pub dimensions: Dimensions,
    pub price_per_board_foot: Decimal,
    pub price_per_piece: Decimal,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub dimensions: Option<Dimensions>,
    pub price_per_board_foot: Option<Decimal>,
    pub price_per_piece: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl Product {
    /// Validate input and build a new active product.
    ///
    /// SKU uniqueness needs storage and is checked by the caller.
    pub fn create(input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let sku = normalize_required("SKU", &input.sku)?;
        let name = normalize_required("name", &input.name)?;
        input.dimensions.validate()?;
        validate_price("price_per_board_foot", input.price_per_board_foot)?;
        validate_price("price_per_piece", input.price_per_piece)?;

        Ok(Self {
            id: ProductId::new(),
            sku,
            name,
            category_id: input.category_id,
            dimensions: input.dimensions,
            price_per_board_foot: input.price_per_board_foot,
            price_per_piece: input.price_per_piece,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update. Nothing changes if any field is invalid.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();

        if let Some(sku) = patch.sku {
            next.sku = normalize_required("SKU", &sku)?;
        }
        if let Some(name) = patch.name {
            next.name = normalize_required("name", &name)?;
        }
        if let Some(category_id) = patch.category_id {
            next.category_id = category_id;
        }
        if let Some(dimensions) = patch.dimensions {
            dimensions.validate()?;
            next.dimensions = dimensions;
        }
        if let Some(price) = patch.price_per_board_foot {
            validate_price("price_per_board_foot", price)?;
            next.price_per_board_foot = price;
        }
        if let Some(price) = patch.price_per_piece {
            validate_price("price_per_piece", price)?;
            next.price_per_piece = price;
        }
        if let Some(is_active) = patch.is_active {
            next.is_active = is_active;
        }

        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Soft delete.
    pub fn archive(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn board_feet(&self) -> DomainResult<Decimal> {
        self.dimensions.board_feet()
    }

    /// Sellable products are active.
    pub fn can_be_sold(&self) -> bool {
        self.is_active
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn normalize_required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn validate_price(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}
