//! Postgres-backed product store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate SKU |
//! | Database (check constraint violation) | `23514` | `Validation` (generic message, detail logged) | Negative stock / non-positive price slipped past validation |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | PoolTimedOut / PoolClosed / Io / other | N/A | `Database` | Connectivity failures |
//!
//! ## Atomic stock reduction
//!
//! `reduce_stock` issues one conditional `UPDATE ... WHERE stock >= $n`.
//! Postgres re-evaluates the predicate against the latest committed row
//! version when two updates race on the same row, so concurrent reductions
//! serialize per row and stock can never go below zero. Only when the update
//! matches nothing do we read the row again, to tell a missing product from
//! a shortfall. That read is a later snapshot: a concurrent restock may
//! already have landed, so the reported `available` is clamped below
//! `requested`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use catalog_core::ProductId;
use catalog_products::{NewProduct, Product, ProductPatch, SearchTerm, StockReduction};

use super::{ProductStore, StoreError};

const PRODUCT_COLUMNS: &str = r#"
    id,
    name,
    description,
    price,
    stock,
    category,
    image_url,
    sku,
    created_at,
    updated_at,
    deleted_at
"#;

/// Postgres-backed product store.
///
/// ## Thread Safety
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
/// Each operation is a single statement, so no explicit transaction is needed.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn current_stock(&self, id: ProductId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT stock FROM products WHERE id = $1 AND deleted_at IS NULL")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_stock", e))?;

        row.map(|r| r.try_get::<i64, _>("stock"))
            .transpose()
            .map_err(|e| map_sqlx_error("current_stock", e))
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self), fields(row_count = tracing::field::Empty))]
    async fn list(&self, category: Option<&str>) -> Result<Vec<Product>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE deleted_at IS NULL AND ($1::TEXT IS NULL OR category = $1) \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(category)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        Span::current().record("row_count", rows.len());
        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn get(&self, id: ProductId) -> Result<Product, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .map(Product::from)
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, term), fields(term = term.as_str()))]
    async fn search(&self, term: &SearchTerm) -> Result<Vec<Product>, StoreError> {
        let sql = format!(
            r"SELECT {PRODUCT_COLUMNS} FROM products
              WHERE deleted_at IS NULL
                AND (name LIKE $1 ESCAPE '\' OR description LIKE $1 ESCAPE '\')
              ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(term.like_pattern())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_products", e))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self, new), fields(sku = %new.sku))]
    async fn create(&self, new: NewProduct) -> Result<Product, StoreError> {
        let now = Utc::now();

        let sql = format!(
            "INSERT INTO products \
                 (name, description, price, stock, category, image_url, sku, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&new.name)
            .bind(&new.description)
            .bind(new.price)
            .bind(new.stock)
            .bind(&new.category)
            .bind(&new.image_url)
            .bind(&new.sku)
            .bind(now)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!(
                        "product with sku '{}' already exists",
                        new.sku
                    ))
                } else {
                    map_sqlx_error("insert_product", e)
                }
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self, patch), fields(product_id = %id))]
    async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, StoreError> {
        // A missing product wins over an invalid patch.
        if let Err(e) = patch.validate() {
            self.get(id).await?;
            return Err(e.into());
        }
        if patch.is_empty() {
            return self.get(id).await;
        }

        let sql = format!(
            "UPDATE products SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 price = COALESCE($4, price), \
                 stock = COALESCE($5, stock), \
                 category = COALESCE($6, category), \
                 image_url = COALESCE($7, image_url), \
                 updated_at = $8 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.get())
            .bind(patch.name)
            .bind(patch.description)
            .bind(patch.price)
            .bind(patch.stock)
            .bind(patch.category)
            .bind(patch.image_url)
            .bind(Utc::now())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?
            .map(Product::from)
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete(&self, id: ProductId) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE products
            SET deleted_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id.get())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, reduction), fields(product_id = %id, quantity = reduction.quantity()))]
    async fn reduce_stock(
        &self,
        id: ProductId,
        reduction: StockReduction,
    ) -> Result<i64, StoreError> {
        let requested = reduction.quantity();
        let remaining = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = $3
            WHERE id = $1 AND deleted_at IS NULL AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id.get())
        .bind(requested)
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reduce_stock", e))?
        .map(|row| row.try_get::<i64, _>("stock"))
        .transpose()
        .map_err(|e| map_sqlx_error("reduce_stock", e))?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        match self.current_stock(id).await? {
            None => Err(StoreError::NotFound),
            Some(seen) => {
                tracing::debug!(seen, requested, "stock reduction rejected");
                Err(shortfall(seen, requested))
            }
        }
    }
}

/// Shortfall reported from a stock level read after the failed update.
fn shortfall(seen: i64, requested: i64) -> StoreError {
    StoreError::InsufficientStock {
        available: seen.min(requested - 1),
        requested,
    }
}

const CHECK_VIOLATION_MESSAGE: &str = "price must be greater than zero and stock must not be negative";

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => {
                    tracing::warn!(operation, error = %msg, "unique constraint rejected write");
                    StoreError::Conflict("a product with this sku already exists".to_string())
                }
                Some("23514") => {
                    tracing::warn!(operation, error = %msg, "check constraint rejected write");
                    StoreError::Validation(CHECK_VIOLATION_MESSAGE.to_string())
                }
                _ => {
                    tracing::error!(operation, error = %msg, "database error");
                    StoreError::Database(msg)
                }
            }
        }
        other => {
            tracing::error!(operation, error = %other, "sqlx error");
            StoreError::Database(format!("sqlx error in {}: {}", operation, other))
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: i64,
    name: String,
    description: String,
    price: f64,
    stock: i64,
    category: String,
    image_url: String,
    sku: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ProductRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            category: row.try_get("category")?,
            image_url: row.try_get("image_url")?,
            sku: row.try_get("sku")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_stored(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
            stock: row.stock,
            category: row.category,
            image_url: row.image_url,
            sku: row.sku,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_never_reports_enough_stock() {
        assert_eq!(
            shortfall(4, 6),
            StoreError::InsufficientStock { available: 4, requested: 6 }
        );
        // Restocked between the rejected update and the follow-up read.
        assert_eq!(
            shortfall(50, 6),
            StoreError::InsufficientStock { available: 5, requested: 6 }
        );
        assert_eq!(
            shortfall(9, 1),
            StoreError::InsufficientStock { available: 0, requested: 1 }
        );
    }

    #[test]
    fn non_database_errors_map_to_database() {
        let err = map_sqlx_error("get_product", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn check_violation_message_is_generic() {
        assert!(!CHECK_VIOLATION_MESSAGE.contains("products"));
        assert!(!CHECK_VIOLATION_MESSAGE.contains("constraint"));
    }
}
