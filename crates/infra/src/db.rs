//! Database adapters: connection pool and schema migrations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::{ConfigError, DatabaseConfig};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to migrate database: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Open a connection pool. Every storage call inherits the pool's acquire
/// timeout.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let options = config.connect_options()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(DbError::Connect)?;

    tracing::info!(
        from_url = config.url.is_some(),
        max_connections = config.max_connections,
        "database connected"
    );
    Ok(pool)
}

/// Create or upgrade the `products` schema.
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migration completed");
    Ok(())
}
