//! Process-wide tracing setup shared by every binary.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, init_with};

/// Initialize process-wide logging: JSON lines, filtered by `RUST_LOG`
/// (default `info`).
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    self::tracing::init_with(LogFormat::from_env());
}
