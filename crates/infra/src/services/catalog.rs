//! Product catalogue with cached read paths.
//!
//! Detail reads are cached under `product_{id}` and list reads under
//! `products_list_v{n}`. Every cached value is stamped with the list version
//! that was current *before* the store was read; an entry whose stamp no
//! longer matches is a miss. That closes the window where a reader fills the
//! cache with a value read before a concurrent commit invalidated it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use lumberyard_core::{DomainError, DomainResult, ProductId};
use lumberyard_inventory::Inventory;
use lumberyard_products::{Category, NewCategory, NewProduct, Product, ProductPatch};

use super::{ServiceResult, found};
use crate::cache::{self, CacheBackend, product_cache_key, products_list_cache_key};
use crate::store::{Store, StoreTx};

/// Stock figures shown alongside a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub quantity_pieces: i64,
    pub total_board_feet: Decimal,
}

impl From<Option<&Inventory>> for InventorySummary {
    fn from(inventory: Option<&Inventory>) -> Self {
        match inventory {
            Some(inv) => Self {
                quantity_pieces: inv.quantity_pieces,
                total_board_feet: inv.total_board_feet,
            },
            None => Self {
                quantity_pieces: 0,
                total_board_feet: Decimal::new(0, 2),
            },
        }
    }
}

/// Product as served to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub product: Product,
    pub board_feet: Decimal,
    pub inventory: InventorySummary,
}

impl ProductView {
    fn new(product: Product, inventory: Option<&Inventory>) -> DomainResult<Self> {
        Ok(Self {
            board_feet: product.board_feet()?,
            inventory: inventory.into(),
            product,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct CachedView<T> {
    version: i64,
    value: T,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(&self, input: NewCategory) -> ServiceResult<Category> {
        let category = Category::create(input, Utc::now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_category(&category).await?;
        tx.commit().await?;

        tracing::info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_categories().await?)
    }

    /// Create a product and its zero-stock inventory row together.
    #[tracing::instrument(skip(self))]
    pub async fn create_product(&self, input: NewProduct) -> ServiceResult<ProductView> {
        let now = Utc::now();
        let product = Product::create(input, now)?;
        let inventory = Inventory::empty(product.id, now);

        let mut tx = self.store.begin().await?;
        found(tx.get_category(product.category_id).await?, || {
            DomainError::validation(format!("category {} does not exist", product.category_id))
        })?;
        ensure_sku_free(tx.as_mut(), &product).await?;
        tx.insert_product(&product).await?;
        tx.insert_inventory(&inventory).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(ProductView::new(product, Some(&inventory))?)
    }

    /// Apply a partial update. A dimension change recomputes the stored
    /// board-foot total of the product's inventory in the same unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn update_product(&self, product_id: ProductId, patch: ProductPatch) -> ServiceResult<ProductView> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut product = found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))?;
        let old_board_feet = product.board_feet()?;

        product.apply_patch(patch, now)?;
        let category_id = product.category_id;
        found(tx.get_category(category_id).await?, || {
            DomainError::validation(format!("category {category_id} does not exist"))
        })?;
        ensure_sku_free(tx.as_mut(), &product).await?;
        tx.update_product(&product).await?;

        let mut inventory = tx.lock_inventory(product_id).await?;
        let board_feet = product.board_feet()?;
        if let Some(inv) = inventory.as_mut().filter(|_| board_feet != old_board_feet) {
            inv.recompute_board_feet(board_feet, now)?;
            tx.update_inventory(inv).await?;
        }
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product updated");
        Ok(ProductView::new(product, inventory.as_ref())?)
    }

    /// Soft delete: the product stops being sellable and drops out of the
    /// list, its inventory row and ledger history stay.
    #[tracing::instrument(skip(self))]
    pub async fn archive_product(&self, product_id: ProductId) -> ServiceResult<Product> {
        let mut tx = self.store.begin().await?;
        let mut product = found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))?;
        product.archive(Utc::now());
        tx.update_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product archived");
        Ok(product)
    }

    /// Uncached read of the product row.
    pub async fn get_product(&self, product_id: ProductId) -> ServiceResult<Product> {
        let mut tx = self.store.begin().await?;
        found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))
    }

    /// Product with stock figures, served from cache when fresh.
    pub async fn product_detail(&self, product_id: ProductId) -> ServiceResult<ProductView> {
        let key = product_cache_key(product_id);
        let version = self.list_version();
        if let Some(view) = self.cached::<ProductView>(&key, version) {
            return Ok(view);
        }

        let mut tx = self.store.begin().await?;
        let product = found(tx.get_product(product_id).await?, || DomainError::ProductNotFound(product_id))?;
        let inventory = tx.get_inventory(product_id).await?;
        drop(tx);

        let view = ProductView::new(product, inventory.as_ref())?;
        self.fill(&key, version, &view);
        Ok(view)
    }

    /// Active products ordered by name, served from cache when fresh.
    pub async fn list_products(&self) -> ServiceResult<Vec<ProductView>> {
        let version = self.list_version();
        let key = products_list_cache_key(version);
        if let Some(views) = self.cached::<Vec<ProductView>>(&key, version) {
            return Ok(views);
        }

        let mut tx = self.store.begin().await?;
        let products = tx.list_products(true).await?;
        let mut views = Vec::with_capacity(products.len());
        for product in products {
            let inventory = tx.get_inventory(product.id).await?;
            views.push(ProductView::new(product, inventory.as_ref())?);
        }
        drop(tx);

        self.fill(&key, version, &views);
        Ok(views)
    }

    fn list_version(&self) -> i64 {
        match cache::invalidator::current_list_version(self.cache.as_ref()) {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "could not read product list version");
                cache::invalidator::INITIAL_LIST_VERSION
            }
        }
    }

    fn cached<T: DeserializeOwned>(&self, key: &str, version: i64) -> Option<T> {
        let raw = match self.cache.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CachedView<T>>(&raw) {
            Ok(entry) if entry.version == version => Some(entry.value),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    fn fill<T: Serialize>(&self, key: &str, version: i64, value: &T) {
        let payload = match serde_json::to_string(&CachedView { version, value }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key, error = %e, "could not encode cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &payload, Some(self.ttl)) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}

async fn ensure_sku_free(tx: &mut dyn StoreTx, product: &Product) -> ServiceResult<()> {
    match tx.find_product_by_sku(&product.sku).await? {
        Some(existing) if existing.id != product.id => {
            Err(DomainError::validation(format!("SKU '{}' is already in use", product.sku)).into())
        }
        _ => Ok(()),
    }
}
