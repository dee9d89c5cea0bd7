//! Request DTOs and their mapping onto domain inputs.
//!
//! Every body field is optional: absence is decided by the domain layer
//! (a missing `name` on create is a validation error, a missing `price` on
//! update means "leave unchanged").

use serde::Deserialize;

use catalog_products::{ProductDraft, ProductPatch};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub sku: Option<String>,
}

impl From<CreateProductRequest> for ProductDraft {
    fn from(req: CreateProductRequest) -> Self {
        ProductDraft {
            name: req.name,
            description: req.description,
            price: req.price,
            stock: req.stock,
            category: req.category,
            image_url: req.image_url,
            sku: req.sku,
        }
    }
}

/// Partial update body. `sku` is immutable, so it is not accepted here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl From<UpdateProductRequest> for ProductPatch {
    fn from(req: UpdateProductRequest) -> Self {
        ProductPatch {
            name: req.name,
            description: req.description,
            price: req.price,
            stock: req.stock,
            category: req.category,
            image_url: req.image_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

impl ListQuery {
    /// `?category=` with an empty value is treated as no filter.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// Kept as a string so that a non-numeric quantity is reported as a
/// validation error rather than a query rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ReduceStockQuery {
    pub quantity: Option<String>,
}
