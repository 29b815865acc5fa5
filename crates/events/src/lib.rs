//! Events and write-notification mechanics.
//!
//! - [`Event`]: the contract every domain event type implements.
//! - [`EntityChange`]: the record a persistence adapter emits for each committed write.
//! - [`WriteObserver`] / [`ChangeDispatcher`]: the seam through which the persistence
//!   layer tells interested parties (cache invalidation, audit logging) that rows changed.
//! - [`execute`]: decide-then-apply helper for aggregates.

pub mod change;
pub mod event;
pub mod handler;
pub mod observer;

pub use change::{ChangeKind, EntityChange, EntityKind};
pub use event::Event;
pub use handler::execute;
pub use observer::{ChangeDispatcher, WriteObserver};
