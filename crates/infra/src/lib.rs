//! Infrastructure layer: persistence, caching, configuration and the
//! application services that tie them to the domain crates.

pub mod cache;
pub mod config;
pub mod services;
pub mod store;

pub use config::Settings;
pub use services::{ServiceError, ServiceResult, Services};
