use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts, named by a stable `event_type`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "sales.confirmation.ready_for_pickup").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
