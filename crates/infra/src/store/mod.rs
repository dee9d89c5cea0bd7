//! Inventory store: the single shared mutable resource of the service.
//!
//! Handlers only ever see `Arc<dyn ProductStore>`; the concrete backend is
//! chosen at startup (`PostgresProductStore` in production,
//! `InMemoryProductStore` for dev/tests).
//!
//! ## Stock reduction
//!
//! `reduce_stock` is a single atomic conditional decrement. Implementations
//! must never read stock, check it, and write it back as separate steps:
//! two concurrent reductions would both pass the check and overdraw.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use catalog_core::{DomainError, ProductId};
use catalog_products::{NewProduct, Product, ProductPatch, SearchTerm, StockReduction, StockShortfall};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;

/// Store-level failure.
///
/// `Database` carries diagnostic detail for server-side logs only; it must not
/// be echoed back to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("product not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("database error: {0}")]
    Database(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => StoreError::Validation(msg),
            // An id that does not parse cannot name a stored product.
            DomainError::InvalidId(_) => StoreError::NotFound,
        }
    }
}

impl From<StockShortfall> for StoreError {
    fn from(s: StockShortfall) -> Self {
        StoreError::InsufficientStock {
            available: s.available,
            requested: s.requested,
        }
    }
}

/// Product persistence + the bounded stock decrement.
///
/// Every read skips soft-deleted rows; a soft-deleted product behaves exactly
/// like a missing one.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All live products, optionally restricted to one category (exact match).
    async fn list(&self, category: Option<&str>) -> Result<Vec<Product>, StoreError>;

    async fn get(&self, id: ProductId) -> Result<Product, StoreError>;

    /// Live products whose name or description contains the term.
    async fn search(&self, term: &SearchTerm) -> Result<Vec<Product>, StoreError>;

    /// Persist a new product. Fails with `Conflict` on a duplicate SKU.
    async fn create(&self, new: NewProduct) -> Result<Product, StoreError>;

    /// Apply the present fields of `patch`. An empty patch returns the record
    /// unchanged.
    async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StoreError>;

    /// Soft-delete. `NotFound` when no live row matched.
    async fn delete(&self, id: ProductId) -> Result<(), StoreError>;

    /// Atomically take `reduction` out of stock; returns the remaining stock.
    async fn reduce_stock(
        &self,
        id: ProductId,
        reduction: StockReduction,
    ) -> Result<i64, StoreError>;
}

#[async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn list(&self, category: Option<&str>) -> Result<Vec<Product>, StoreError> {
        (**self).list(category).await
    }

    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        (**self).get(id).await
    }

    async fn search(&self, term: &SearchTerm) -> Result<Vec<Product>, StoreError> {
        (**self).search(term).await
    }

    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        (**self).create(new).await
    }

    async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }

    async fn reduce_stock(
        &self,
        id: ProductId,
        reduction: StockReduction,
    ) -> Result<i64, StoreError> {
        (**self).reduce_stock(id, reduction).await
    }
}
