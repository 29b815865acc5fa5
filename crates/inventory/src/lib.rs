//! Stock ledger domain module.
//!
//! Per-product stock (`Inventory`) is only ever changed by planning a signed
//! [`StockTransaction`] against the current row with [`plan_stock_change`].
//! The plan carries both the next inventory row and the transaction to append,
//! so a storage adapter can persist them together or not at all.

pub mod inventory;
pub mod ledger;
pub mod transaction;

pub use inventory::Inventory;
pub use ledger::{StockChange, StockRequest, plan_stock_change};
pub use transaction::{StockTransaction, TransactionType};
