//! Infrastructure wiring: picks the checkout store from configuration.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use uuid::Uuid;

use storefront_catalog::NewProduct;
use storefront_core::ProductId;
use storefront_infra::{
    AppConfig, CheckoutService, CheckoutStore, InMemoryCheckoutStore, PostgresCheckoutStore,
};

pub type Checkout = CheckoutService<Arc<dyn CheckoutStore>>;

pub struct AppServices {
    pub checkout: Checkout,
}

impl AppServices {
    pub fn new(store: Arc<dyn CheckoutStore>, config: &AppConfig) -> Self {
        Self {
            checkout: CheckoutService::new(store, config.checkout),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(Arc::new(InMemoryCheckoutStore::new()), config)
    }
}

/// Build services from configuration: PostgreSQL when `DATABASE_URL` is set,
/// otherwise the in-memory store.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match &config.database.url {
        Some(url) => {
            let store = PostgresCheckoutStore::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to DATABASE_URL")?;
            store
                .migrate()
                .await
                .context("failed to apply checkout schema")?;
            tracing::info!("using postgres checkout store");
            Ok(AppServices::new(Arc::new(store), config))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory checkout store");
            Ok(AppServices::in_memory(config))
        }
    }
}

/// Register a small demo catalog with stable ids.
pub async fn seed_demo_catalog(services: &AppServices) -> anyhow::Result<Vec<ProductId>> {
    let demo = [
        (0x01_u128, "Stoneware Teapot", Decimal::new(5000, 2), None, 25),
        (0x02, "Copper Kettle", Decimal::new(6000, 2), None, 10),
        (0x03, "Linen Tea Towel", Decimal::new(1200, 2), Some(Decimal::new(999, 2)), 100),
    ];

    let mut ids = Vec::with_capacity(demo.len());
    for (raw, name, price, discount_price, stock) in demo {
        let id = ProductId::from_uuid(Uuid::from_u128(raw));
        services
            .checkout
            .register_product(NewProduct {
                id,
                name: name.to_string(),
                price,
                discount_price,
                stock_quantity: stock,
                image_url: None,
                is_active: true,
            })
            .await
            .with_context(|| format!("failed to seed product '{name}'"))?;
        tracing::info!(product_id = %id, name, "seeded demo product");
        ids.push(id);
    }
    Ok(ids)
}
