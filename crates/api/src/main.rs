use std::sync::Arc;

use anyhow::Context;

use catalog_infra::AppConfig;

#[tokio::main]
async fn main() {
    // A missing .env is fine; the real environment still applies.
    dotenvy::dotenv().ok();
    catalog_observability::init();

    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "catalog-api failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let services = catalog_api::app::services::build_services(&config)
        .await
        .context("initialising product store")?;

    let app = catalog_api::app::build_app(Arc::new(services), config.request_timeout);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
