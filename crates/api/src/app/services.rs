use std::sync::Arc;

use catalog_infra::{
    AppConfig, InMemoryProductStore, PostgresProductStore, ProductStore,
    db::{self, DbError},
};

/// Shared handles injected into every handler via `Extension<Arc<AppServices>>`.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<dyn ProductStore>,
}

impl AppServices {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    /// Services backed by a fresh, empty in-memory store (dev/tests).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryProductStore::new()))
    }

    pub fn store(&self) -> &dyn ProductStore {
        self.store.as_ref()
    }
}

/// Select and initialise the product store.
///
/// With `USE_PERSISTENT_STORES=true` (the default) a Postgres pool is opened
/// and migrations are applied before the server accepts traffic; any failure
/// there is fatal to startup.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, DbError> {
    if !config.use_persistent_stores {
        tracing::warn!("USE_PERSISTENT_STORES=false; products live in memory only");
        return Ok(AppServices::in_memory());
    }

    let pool = db::connect(&config.database).await?;
    db::migrate(&pool).await?;

    Ok(AppServices::new(Arc::new(PostgresProductStore::new(pool))))
}
