//! Read-side filters over the catalog.

use catalog_core::{DomainError, DomainResult};

use crate::product::Product;

/// Non-empty substring to look for in a product's name or description.
///
/// Matching is case-sensitive, in line with `LIKE` under the default
/// Postgres collation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        // Whitespace is a legitimate substring; only an empty query is refused.
        if raw.is_empty() {
            return Err(DomainError::validation("search query is required"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, product: &Product) -> bool {
        product.name.contains(&self.0) || product.description.contains(&self.0)
    }

    /// `%term%` with `LIKE` metacharacters escaped, for use with `ESCAPE '\'`.
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.0.len() + 2);
        pattern.push('%');
        for c in self.0.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

/// Exact, case-sensitive category match.
pub fn in_category(product: &Product, category: &str) -> bool {
    product.category == category
}
