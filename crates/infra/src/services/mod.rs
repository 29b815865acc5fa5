//! Application services.
//!
//! Each public operation opens one unit of work, runs the domain decision,
//! performs every side effect (stock movements, notifications, deliveries)
//! in that same unit of work and commits. Any error drops the unit of work,
//! so nothing it wrote is persisted and no observer hears about it.
//!
//! Helpers suffixed `_in_tx` take an open `&mut dyn StoreTx` so that one
//! service can compose another's writes into its own unit of work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use lumberyard_core::DomainError;

use crate::cache::{CacheBackend, CacheError, InMemoryCache, InventoryCacheInvalidator};
use crate::config::Settings;
use crate::store::{InMemoryStore, PostgresStore, Store, StoreError};

pub mod catalog;
pub mod confirmation;
pub mod delivery;
pub mod ledger;
pub mod lumbering;
pub mod notifications;
pub mod sales;

pub use catalog::{CatalogService, InventorySummary, ProductView};
pub use confirmation::{ConfirmationService, NewConfirmation};
pub use delivery::DeliveryService;
pub use ledger::StockLedger;
pub use lumbering::{LumberingService, ServiceOrderDetail};
pub use notifications::NotificationService;
pub use sales::{NewOrderLine, NewSalesOrder, SalesService};

/// Error returned by every application operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }
}

/// Failure while wiring services from settings.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Every service, sharing one store and one cache.
///
/// The cache invalidator is registered with the store's change dispatcher on
/// construction, so every commit that touches products, inventory or stock
/// transactions invalidates the product caches before it returns.
#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub ledger: StockLedger,
    pub sales: SalesService,
    pub confirmations: ConfirmationService,
    pub notifications: NotificationService,
    pub deliveries: DeliveryService,
    pub lumbering: LumberingService,
    pub invalidator: Arc<InventoryCacheInvalidator>,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheBackend>,
        cache_ttl: Duration,
        recent_notifications: usize,
    ) -> Self {
        let invalidator = Arc::new(InventoryCacheInvalidator::new(cache.clone()));
        store.change_dispatcher().register(invalidator.clone());

        Self {
            catalog: CatalogService::new(store.clone(), cache, cache_ttl),
            ledger: StockLedger::new(store.clone()),
            sales: SalesService::new(store.clone()),
            confirmations: ConfirmationService::new(store.clone()),
            notifications: NotificationService::new(store.clone(), recent_notifications),
            deliveries: DeliveryService::new(store.clone()),
            lumbering: LumberingService::new(store),
            invalidator,
        }
    }

    /// In-memory store and cache with default settings (tests/dev).
    pub fn in_memory() -> Self {
        let defaults = Settings::default();
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCache::new()),
            defaults.cache_ttl,
            defaults.recent_notifications,
        )
    }

    /// Postgres when `database_url` is set, Redis when `redis_url` is set,
    /// in-memory otherwise.
    pub async fn from_settings(settings: &Settings) -> Result<Self, InitError> {
        let store: Arc<dyn Store> = match &settings.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url).await?;
                store.migrate().await?;
                tracing::info!("using postgres store");
                Arc::new(store)
            }
            None => {
                tracing::info!("using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };

        let cache = build_cache(settings)?;
        tracing::info!(cache = cache.name(), "cache backend ready");

        Ok(Self::new(
            store,
            cache,
            settings.cache_ttl,
            settings.recent_notifications,
        ))
    }
}

#[cfg(feature = "redis")]
fn build_cache(settings: &Settings) -> Result<Arc<dyn CacheBackend>, InitError> {
    match &settings.redis_url {
        Some(url) => Ok(Arc::new(crate::cache::RedisCache::new(url)?)),
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
fn build_cache(settings: &Settings) -> Result<Arc<dyn CacheBackend>, InitError> {
    if settings.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but redis support is not compiled in; using in-memory cache");
    }
    Ok(Arc::new(InMemoryCache::new()))
}

/// Map a missing row to its domain error.
pub(crate) fn found<T>(row: Option<T>, missing: impl FnOnce() -> DomainError) -> ServiceResult<T> {
    row.ok_or_else(|| ServiceError::Domain(missing()))
}
