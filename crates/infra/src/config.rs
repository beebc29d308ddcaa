//! Service configuration.
//!
//! Loaded from environment variables (and a `.env` file when present) with
//! defaults that reproduce the storefront's published checkout policy.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use storefront_observability::{LogConfig, LogFormat};
use storefront_orders::PricingPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `None` selects the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Knobs injected into `CheckoutService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub pricing: PricingPolicy,
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// Extra attempts after a transient write conflict.
    pub max_conflict_retries: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            default_page_size: 20,
            max_page_size: 100,
            max_conflict_retries: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: var("STOREFRONT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "STOREFRONT_PORT", 8080)?,
        };

        let database = DatabaseConfig {
            url: var("DATABASE_URL"),
            max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
        };
        if database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "DATABASE_MAX_CONNECTIONS",
                "0",
                "must be at least 1",
            ));
        }

        let log = LogConfig {
            format: parse_or(&var, "STOREFRONT_LOG_FORMAT", LogFormat::Json)?,
            level: var("STOREFRONT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        let defaults = CheckoutConfig::default();
        let pricing = PricingPolicy {
            tax_rate: parse_or(&var, "CHECKOUT_TAX_RATE", defaults.pricing.tax_rate)?,
            flat_shipping: parse_or(&var, "CHECKOUT_FLAT_SHIPPING", defaults.pricing.flat_shipping)?,
            free_shipping_threshold: parse_or(
                &var,
                "CHECKOUT_FREE_SHIPPING_THRESHOLD",
                defaults.pricing.free_shipping_threshold,
            )?,
            max_line_items: parse_or(&var, "CHECKOUT_MAX_LINE_ITEMS", defaults.pricing.max_line_items)?,
        };
        for (key, value) in [
            ("CHECKOUT_TAX_RATE", pricing.tax_rate),
            ("CHECKOUT_FLAT_SHIPPING", pricing.flat_shipping),
            ("CHECKOUT_FREE_SHIPPING_THRESHOLD", pricing.free_shipping_threshold),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::invalid(key, &value.to_string(), "must not be negative"));
            }
        }
        if pricing.max_line_items == 0 {
            return Err(ConfigError::invalid("CHECKOUT_MAX_LINE_ITEMS", "0", "must be at least 1"));
        }

        let checkout = CheckoutConfig {
            pricing,
            default_page_size: parse_or(&var, "CHECKOUT_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or(&var, "CHECKOUT_MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_conflict_retries: parse_or(
                &var,
                "CHECKOUT_MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
        };
        if checkout.default_page_size == 0 || checkout.default_page_size > checkout.max_page_size {
            return Err(ConfigError::invalid(
                "CHECKOUT_DEFAULT_PAGE_SIZE",
                &checkout.default_page_size.to_string(),
                format!("must be between 1 and {}", checkout.max_page_size),
            ));
        }

        Ok(Self {
            server,
            database,
            log,
            checkout,
        })
    }

    /// Deterministic configuration for tests: in-memory store, ephemeral port.
    pub fn test() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            log: LogConfig {
                format: LogFormat::Pretty,
                level: "warn".to_string(),
            },
            checkout: CheckoutConfig::default(),
        }
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(key, &raw, e.to_string())),
    }
}
