// Stock search, price conversion and upload pre-processing for a used-vehicle
// export storefront.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use reqwest::Client;

pub mod config;
pub mod currency;
pub mod error;
pub mod exchange_rate;
pub mod filter;
pub mod image_processing;
pub mod inventory;
pub mod models;
pub mod routes;

use crate::config::Settings;
use crate::exchange_rate::{ExchangeRateService, FileRateStore, HttpRateProvider};
use crate::models::VehicleRecord;

// Shared application state handed to every handler
#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub vehicles: Arc<Vec<VehicleRecord>>,
    pub exchange_rates: Arc<ExchangeRateService>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        vehicles: Vec<VehicleRecord>,
        exchange_rates: Arc<ExchangeRateService>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            vehicles: Arc::new(vehicles),
            exchange_rates,
        }
    }

    /// Production wiring: inventory from disk, live rate provider, file-backed rate cache.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let vehicles = inventory::load(&settings.inventory_path)
            .with_context(|| format!("Failed to load inventory from {}", settings.inventory_path))?;

        // It will automatically pick up HTTP_PROXY/HTTPS_PROXY
        let http_client = Arc::new(
            Client::builder()
                .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
                .timeout(settings.exchange_rate.request_timeout())
                .build()
                .context("Failed to build shared reqwest client")?,
        );

        let rates = &settings.exchange_rate;
        let exchange_rates = Arc::new(ExchangeRateService::new(
            Arc::new(HttpRateProvider::new(http_client, rates.endpoint.clone())),
            Arc::new(FileRateStore::new(&rates.cache_path)),
            rates.ttl(),
            rates.default_rate,
        ));

        Ok(Self::new(settings, vehicles, exchange_rates))
    }
}
