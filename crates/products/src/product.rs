use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use catalog_core::{DomainError, DomainResult, ProductId};

/// A product record as stored and served by the catalog.
///
/// `deleted_at` is the soft-delete marker; it is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub image_url: String,
    pub sku: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    /// Decrement stock if (and only if) enough is available.
    ///
    /// On failure the product is left untouched.
    pub fn reduce_stock(
        &mut self,
        reduction: StockReduction,
        now: DateTime<Utc>,
    ) -> Result<i64, StockShortfall> {
        let requested = reduction.quantity();
        if self.stock < requested {
            return Err(StockShortfall {
                available: self.stock,
                requested,
            });
        }
        self.stock -= requested;
        self.updated_at = now;
        Ok(self.stock)
    }
}

/// Unvalidated create payload.
///
/// Every field is optional so that a missing field surfaces as a validation
/// failure naming that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub sku: Option<String>,
}

/// A validated create request, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub image_url: String,
    pub sku: String,
}

impl NewProduct {
    pub fn validate(draft: ProductDraft) -> DomainResult<Self> {
        let name = required_text("name", draft.name)?;
        let description = required_text("description", draft.description)?;
        let price = draft
            .price
            .ok_or_else(|| DomainError::validation("price is required"))?;
        validate_price(price)?;
        let stock = draft
            .stock
            .ok_or_else(|| DomainError::validation("stock is required"))?;
        validate_stock(stock)?;
        let category = required_text("category", draft.category)?;
        let sku = required_text("sku", draft.sku)?;

        Ok(Self {
            name,
            description,
            price,
            stock,
            category,
            image_url: draft.image_url.unwrap_or_default(),
            sku,
        })
    }

    /// Materialize the record with a store-assigned id and timestamps.
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category: self.category,
            image_url: self.image_url,
            sku: self.sku,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial update with explicit presence markers.
///
/// `None` means "leave unchanged"; `Some(v)` is validated and applied, so
/// `stock: Some(0)` is a real update. SKU is fixed at creation and cannot be
/// patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            non_blank("name", name)?;
        }
        if let Some(description) = &self.description {
            non_blank("description", description)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(stock) = self.stock {
            validate_stock(stock)?;
        }
        if let Some(category) = &self.category {
            non_blank("category", category)?;
        }
        Ok(())
    }

    /// Apply present fields. Returns `false` (and leaves `updated_at` alone)
    /// when the patch is empty.
    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
        if let Some(image_url) = &self.image_url {
            product.image_url = image_url.clone();
        }
        product.updated_at = now;
        true
    }
}

/// A positive quantity to take out of stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockReduction(i64);

impl StockReduction {
    pub fn new(quantity: i64) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be a positive integer"));
        }
        Ok(Self(quantity))
    }

    pub fn quantity(&self) -> i64 {
        self.0
    }
}

impl core::str::FromStr for StockReduction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let quantity = s
            .trim()
            .parse::<i64>()
            .map_err(|_| DomainError::validation("quantity must be a positive integer"))?;
        Self::new(quantity)
    }
}

/// Rejected reduction: not enough stock on hand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("insufficient stock: {available} available, {requested} requested")]
pub struct StockShortfall {
    pub available: i64,
    pub requested: i64,
}

fn required_text(field: &str, value: Option<String>) -> DomainResult<String> {
    let value = value.ok_or_else(|| DomainError::validation(format!("{field} is required")))?;
    non_blank(field, &value)?;
    Ok(value)
}

fn non_blank(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn validate_price(price: f64) -> DomainResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(DomainError::validation("price must be greater than zero"));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> DomainResult<()> {
    if stock < 0 {
        return Err(DomainError::validation("stock cannot be negative"));
    }
    Ok(())
}
