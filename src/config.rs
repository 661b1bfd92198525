// Layered configuration: defaults, then config.toml, then APP_* environment variables.

use std::time::Duration;

use anyhow::{Result, bail};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::exchange_rate::DEFAULT_RATE;
use crate::image_processing::{CompressionOptions, OutputFormat, ValidationOptions};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    pub server_address: String,
    pub inventory_path: String,
    pub exchange_rate: ExchangeRateSettings,
    pub images: ImageSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExchangeRateSettings {
    pub endpoint: String,
    pub ttl_secs: u64,
    pub default_rate: f64,
    pub cache_path: String,
    pub request_timeout_secs: u64,
}

impl ExchangeRateSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageSettings {
    pub max_size_mb: f64,
    pub allowed_types: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
    pub max_size_kb: u32,
    pub output_format: OutputFormat,
}

impl ImageSettings {
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions { max_size_mb: self.max_size_mb, allowed_types: self.allowed_types.clone() }
    }

    pub fn compression_options(&self) -> CompressionOptions {
        CompressionOptions {
            max_width: self.max_width,
            max_height: self.max_height,
            quality: self.quality,
            max_size_kb: self.max_size_kb,
            output_format: self.output_format,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:3000".to_string(),
            inventory_path: "data/inventory.csv".to_string(),
            exchange_rate: ExchangeRateSettings {
                endpoint: "https://api.exchangerate-api.com/v4/latest/USD".to_string(),
                ttl_secs: 3600,
                default_rate: DEFAULT_RATE,
                cache_path: "data/exchange_rate.json".to_string(),
                request_timeout_secs: 10,
            },
            images: ImageSettings::default(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        let validation = ValidationOptions::default();
        let compression = CompressionOptions::default();
        Self {
            max_size_mb: validation.max_size_mb,
            allowed_types: validation.allowed_types,
            max_width: compression.max_width,
            max_height: compression.max_height,
            quality: compression.quality,
            max_size_kb: compression.max_size_kb,
            output_format: compression.output_format,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            // Add default values
            .add_source(Config::try_from(&Settings::default())?)
            // Load from a configuration file (config.toml)
            .add_source(File::with_name("config").required(false))
            // Nested keys use a double underscore, e.g. APP_EXCHANGE_RATE__TTL_SECS
            .add_source(Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<()> {
        if self.exchange_rate.ttl_secs == 0 {
            bail!("exchange_rate.ttl_secs must be positive");
        }
        if !(self.exchange_rate.default_rate.is_finite() && self.exchange_rate.default_rate > 0.0) {
            bail!("exchange_rate.default_rate must be positive, got {}", self.exchange_rate.default_rate);
        }
        self.images.compression_options().validate()?;
        Ok(())
    }
}
