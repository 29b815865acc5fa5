//! Lumbering (milling) service ledger.
//!
//! Customers bring their own logs; the yard mills them for a fee per board
//! foot of output and keeps or splits the shavings. Pure domain logic only.

pub mod output;
pub mod service_order;
pub mod shavings;

pub use output::{LumberGrade, LumberingOutput, NewOutput};
pub use service_order::{
    DEFAULT_FEE_PER_BOARD_FOOT, LumberingServiceOrder, NewServiceOrder, ServiceStatus,
    ShavingsOwnership,
};
pub use shavings::{NewShavings, ShavingsRecord, ShavingsUnit, resolve_shares};
