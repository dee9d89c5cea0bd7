//! Products domain module.
//!
//! This crate contains the catalog's business rules (create validation,
//! explicit-presence partial updates, bounded stock reduction, search and
//! category filters), implemented as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod product;
pub mod query;

pub use product::{
    NewProduct, Product, ProductDraft, ProductPatch, StockReduction, StockShortfall,
};
pub use query::{SearchTerm, in_category};
