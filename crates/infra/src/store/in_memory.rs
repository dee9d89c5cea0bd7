use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use catalog_core::ProductId;
use catalog_products::{
    NewProduct, Product, ProductPatch, SearchTerm, StockReduction, in_category,
};

use super::{ProductStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    // Ids are handed out in increasing order, so the map stays in creation order.
    rows: BTreeMap<ProductId, Product>,
    last_id: i64,
    // Covers soft-deleted rows too, like the unique index in Postgres.
    skus: HashMap<String, ProductId>,
}

/// In-memory product store for tests/dev.
///
/// Every mutation happens under one write guard, which makes each operation
/// (including the stock decrement) atomic with respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: RwLock<Inner>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }

    fn collect(&self, keep: impl Fn(&Product) -> bool) -> Result<Vec<Product>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .rows
            .values()
            .filter(|p| !p.is_deleted() && keep(p))
            .cloned()
            .collect())
    }
}

fn live_mut(inner: &mut Inner, id: ProductId) -> Result<&mut Product, StoreError> {
    inner
        .rows
        .get_mut(&id)
        .filter(|p| !p.is_deleted())
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn list(&self, category: Option<&str>) -> Result<Vec<Product>, StoreError> {
        match category {
            Some(category) => self.collect(|p| in_category(p, category)),
            None => self.collect(|_| true),
        }
    }

    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        let inner = self.read()?;
        inner
            .rows
            .get(&id)
            .filter(|p| !p.is_deleted())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn search(&self, term: &SearchTerm) -> Result<Vec<Product>, StoreError> {
        self.collect(|p| term.matches(p))
    }

    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut inner = self.write()?;
        if inner.skus.contains_key(&new.sku) {
            return Err(StoreError::Conflict(format!(
                "product with sku '{}' already exists",
                new.sku
            )));
        }

        inner.last_id += 1;
        let product = new.into_product(ProductId::from_stored(inner.last_id), Utc::now());
        inner.skus.insert(product.sku.clone(), product.id);
        inner.rows.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        let mut inner = self.write()?;
        let product = live_mut(&mut inner, id)?;
        patch.validate()?;
        patch.apply_to(product, Utc::now());
        Ok(product.clone())
    }

    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let product = live_mut(&mut inner, id)?;
        product.soft_delete(Utc::now());
        Ok(())
    }

    async fn reduce_stock(
        &self,
        id: ProductId,
        reduction: StockReduction,
    ) -> Result<i64, StoreError> {
        let mut inner = self.write()?;
        let product = live_mut(&mut inner, id)?;
        let remaining = product.reduce_stock(reduction, Utc::now())?;
        Ok(remaining)
    }
}
