//! Lumber catalogue domain module.
//!
//! This crate contains business rules for the lumber catalogue (products,
//! categories, nominal dimensions and board-foot arithmetic), implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod board_feet;
pub mod category;
pub mod product;

pub use board_feet::{board_feet_per_piece, lot_board_feet, total_board_feet};
pub use category::{Category, NewCategory};
pub use product::{Dimensions, NewProduct, Product, ProductPatch};
