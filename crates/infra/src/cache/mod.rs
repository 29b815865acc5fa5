//! Key/value cache seam.
//!
//! `get`/`set`/`delete` are required. The atomic primitives the list-version
//! counter relies on are optional capabilities: a backend that cannot offer one
//! returns [`CacheError::Unsupported`] and callers degrade to the next
//! strategy (see [`InventoryCacheInvalidator`]).

use std::time::Duration;

use thiserror::Error;

use lumberyard_core::ProductId;

pub mod in_memory;
pub mod invalidator;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryCache;
pub use invalidator::InventoryCacheInvalidator;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

/// Counter bumped on every write that can change a product list response.
pub const PRODUCTS_LIST_VERSION_KEY: &str = "products_list_version";

/// Pattern matching every versioned product-list entry.
pub const PRODUCTS_LIST_PATTERN: &str = "products_list_*";

/// Key of the cached product detail view.
pub fn product_cache_key(product_id: ProductId) -> String {
    format!("product_{product_id}")
}

/// Key of the cached product list view for list version `version`.
pub fn products_list_cache_key(version: i64) -> String {
    format!("products_list_v{version}")
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend does not offer this optional capability.
    #[error("cache backend does not support {0}")]
    Unsupported(&'static str),

    #[error("cache backend error: {0}")]
    Backend(String),

    /// `incr` on a value that is not an integer.
    #[error("cached value under '{0}' is not an integer")]
    NotAnInteger(String),
}

/// A string key/value cache with optional atomic primitives.
///
/// Implementations must be safe to share across threads; they are called from
/// request handlers and from commit hooks.
pub trait CacheBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`. `ttl = None` keeps it until deleted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically add `delta` to an existing integer value and return the new
    /// value. Returns `Ok(None)` without creating anything when `key` is missing.
    fn incr(&self, _key: &str, _delta: i64) -> Result<Option<i64>, CacheError> {
        Err(CacheError::Unsupported("incr"))
    }

    /// Set `key` only if it does not exist. Returns whether it was set.
    fn add(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<bool, CacheError> {
        Err(CacheError::Unsupported("add"))
    }

    /// Replace the value under `key` with `new` only if the current value is
    /// `expected` (`None` meaning "absent"). Returns whether it was replaced.
    fn compare_and_swap(&self, _key: &str, _expected: Option<&str>, _new: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unsupported("compare_and_swap"))
    }

    /// Delete every key matching a glob with `*` wildcards. Returns how many
    /// keys were deleted.
    fn delete_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::Unsupported("delete_pattern"))
    }
}

/// `*`-only glob match.
pub(crate) fn glob_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let mut parts: Vec<&str> = parts.collect();
    let Some(last) = parts.pop() else {
        // No `*` at all: exact match.
        return rest.is_empty();
    };

    for part in parts {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
