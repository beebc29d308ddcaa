use std::sync::Arc;

use anyhow::Context;

use storefront_api::app::{self, services};
use storefront_api::middleware::HeaderIdentityProvider;
use storefront_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    storefront_observability::init(&config.log);

    let services = services::build_services(&config).await?;
    if config.database.url.is_none() {
        services::seed_demo_catalog(&services).await?;
    }

    let app = app::build_app(Arc::new(services), Arc::new(HeaderIdentityProvider));

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
