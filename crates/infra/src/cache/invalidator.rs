//! Cache invalidation on product, inventory and stock-transaction writes.
//!
//! Two schemes run side by side:
//!
//! - **Point invalidation**: the `product_{id}` detail entry of every product
//!   touched by a committed unit of work is deleted.
//! - **List versioning**: list responses are cached under
//!   `products_list_v{n}` where `n` is the current value of
//!   `products_list_version` (1 when absent). Bumping the counter turns every
//!   previously cached list into a miss without having to find it.
//!
//! The counter is bumped exactly once per committed unit of work that touched
//! any of the three entity types, with the strongest primitive the backend
//! offers:
//!
//! 1. `incr` (atomic). A missing key is initialised to 2 with `add`, so a list
//!    cached under the implicit version 1 is stale after the first change.
//! 2. `compare_and_swap` with bounded retry.
//! 3. `delete_pattern("products_list_*")` as a best-effort last resort.
//!
//! Cache failures never fail the write that triggered them. They are logged at
//! `warn` and leave a staleness window bounded by the cache TTL;
//! [`InventoryCacheInvalidator::bump_list_version`] and
//! [`InventoryCacheInvalidator::invalidate_product`] can be called to close it.

use std::collections::BTreeSet;
use std::sync::Arc;

use lumberyard_core::ProductId;
use lumberyard_events::{EntityChange, WriteObserver};

use super::{
    CacheBackend, CacheError, PRODUCTS_LIST_PATTERN, PRODUCTS_LIST_VERSION_KEY, product_cache_key,
};

/// Version readers assume when the counter does not exist yet.
pub const INITIAL_LIST_VERSION: i64 = 1;

const CAS_ATTEMPTS: usize = 8;

/// How the list version was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListBump {
    /// Counter now holds this value.
    Bumped(i64),
    /// Counter unsupported; cached lists were deleted instead.
    Purged(u64),
}

pub struct InventoryCacheInvalidator {
    cache: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for InventoryCacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryCacheInvalidator")
            .field("cache", &self.cache.name())
            .finish()
    }
}

impl InventoryCacheInvalidator {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &dyn CacheBackend {
        self.cache.as_ref()
    }

    /// Delete the cached detail view of `product_id`.
    pub fn invalidate_product(&self, product_id: ProductId) -> Result<(), CacheError> {
        self.cache.delete(&product_cache_key(product_id))
    }

    /// Increment `products_list_version` by exactly one.
    pub fn bump_list_version(&self) -> Result<ListBump, CacheError> {
        match self.bump_with_incr() {
            Err(CacheError::Unsupported(capability)) => {
                tracing::debug!(cache = self.cache.name(), capability, "atomic increment unavailable, using compare-and-swap");
            }
            other => return other.map(ListBump::Bumped),
        }

        match self.bump_with_cas() {
            Err(CacheError::Unsupported(capability)) => {
                tracing::debug!(cache = self.cache.name(), capability, "compare-and-swap unavailable, purging cached lists");
            }
            other => return other.map(ListBump::Bumped),
        }

        self.cache
            .delete_pattern(PRODUCTS_LIST_PATTERN)
            .map(ListBump::Purged)
    }

    /// Current list version (1 when the counter does not exist yet).
    pub fn current_list_version(&self) -> Result<i64, CacheError> {
        current_list_version(self.cache.as_ref())
    }

    fn bump_with_incr(&self) -> Result<i64, CacheError> {
        if let Some(v) = self.cache.incr(PRODUCTS_LIST_VERSION_KEY, 1)? {
            return Ok(v);
        }
        let first = INITIAL_LIST_VERSION + 1;
        if self
            .cache
            .add(PRODUCTS_LIST_VERSION_KEY, &first.to_string(), None)?
        {
            return Ok(first);
        }
        // Someone else initialised it between our incr and add.
        self.cache
            .incr(PRODUCTS_LIST_VERSION_KEY, 1)?
            .ok_or_else(|| CacheError::Backend("list version vanished during increment".to_string()))
    }

    fn bump_with_cas(&self) -> Result<i64, CacheError> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self.cache.get(PRODUCTS_LIST_VERSION_KEY)?;
            let current_version = match current.as_deref() {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| CacheError::NotAnInteger(PRODUCTS_LIST_VERSION_KEY.to_string()))?,
                None => INITIAL_LIST_VERSION,
            };
            let next = current_version + 1;
            if self
                .cache
                .compare_and_swap(PRODUCTS_LIST_VERSION_KEY, current.as_deref(), &next.to_string())?
            {
                return Ok(next);
            }
        }
        Err(CacheError::Backend(format!(
            "list version still contended after {CAS_ATTEMPTS} attempts"
        )))
    }
}

/// Read the list version from `cache`; absent means [`INITIAL_LIST_VERSION`].
pub fn current_list_version(cache: &dyn CacheBackend) -> Result<i64, CacheError> {
    match cache.get(PRODUCTS_LIST_VERSION_KEY)? {
        Some(raw) => raw
            .parse()
            .map_err(|_| CacheError::NotAnInteger(PRODUCTS_LIST_VERSION_KEY.to_string())),
        None => Ok(INITIAL_LIST_VERSION),
    }
}

impl WriteObserver for InventoryCacheInvalidator {
    fn name(&self) -> &'static str {
        "inventory_cache_invalidator"
    }

    fn on_commit(&self, changes: &[EntityChange]) {
        let relevant: Vec<&EntityChange> = changes
            .iter()
            .filter(|c| c.entity.affects_product_reads())
            .collect();
        if relevant.is_empty() {
            return;
        }

        let products: BTreeSet<ProductId> = relevant.iter().filter_map(|c| c.product_id).collect();
        for product_id in &products {
            if let Err(e) = self.invalidate_product(*product_id) {
                tracing::warn!(
                    cache = self.cache.name(),
                    product_id = %product_id,
                    error = %e,
                    "failed to invalidate cached product"
                );
            }
        }

        match self.bump_list_version() {
            Ok(bump) => tracing::debug!(
                cache = self.cache.name(),
                products = products.len(),
                changes = relevant.len(),
                ?bump,
                "product caches invalidated"
            ),
            Err(e) => tracing::warn!(
                cache = self.cache.name(),
                error = %e,
                "failed to bump product list version; cached lists may be stale until they expire"
            ),
        }
    }
}
