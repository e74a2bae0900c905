//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Allowed CORS origins, comma separated
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

fn default_run_migrations() -> bool {
    true
}

/// Redis configuration
///
/// Redis is optional; without a URL the rate policy reads settings directly.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: Option<String>,
}

/// Calling provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider REST API
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// Upper bound for a single call-creation request
    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,

    /// Display name attached to outbound calls
    #[serde(default = "default_call_name")]
    pub call_name: String,

    /// Calls requested per sync run
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: u32,
}

fn default_provider_url() -> String {
    "https://api.vapi.ai".to_string()
}

fn default_provider_timeout() -> u64 {
    10_000
}

fn default_call_name() -> String {
    "Outbound Campaign".to_string()
}

fn default_sync_page_size() -> u32 {
    100
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            timeout_ms: default_provider_timeout(),
            call_name: default_call_name(),
            sync_page_size: default_sync_page_size(),
        }
    }
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Multiplier used when the rate setting is missing or malformed
    #[serde(default = "default_rate_multiplier")]
    pub default_rate_multiplier: f64,

    /// Age after which an unprocessed transaction is reported
    #[serde(default = "default_grace_period")]
    pub ledger_grace_period_secs: i64,

    /// Interval between ledger audit sweeps
    #[serde(default = "default_audit_interval")]
    pub audit_interval_secs: u64,

    /// TTL for cached rate multipliers
    #[serde(default = "default_rate_cache_ttl")]
    pub rate_cache_ttl_secs: u64,
}

fn default_rate_multiplier() -> f64 {
    2.0
}

fn default_grace_period() -> i64 {
    300
}

fn default_audit_interval() -> u64 {
    60
}

fn default_rate_cache_ttl() -> u64 {
    60
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_rate_multiplier: default_rate_multiplier(),
            ledger_grace_period_secs: default_grace_period(),
            audit_interval_secs: default_audit_interval(),
            rate_cache_ttl_secs: default_rate_cache_ttl(),
        }
    }
}

impl BillingConfig {
    /// Fallback multiplier as a decimal, guarding against non-positive config values
    pub fn fallback_multiplier(&self) -> Decimal {
        Decimal::try_from(self.default_rate_multiplier)
            .ok()
            .filter(|m| *m > Decimal::ZERO)
            .unwrap_or(Decimal::TWO)
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 20)?
            .set_default("database.run_migrations", true)?
            .set_default("provider.base_url", "https://api.vapi.ai")?
            .set_default("provider.timeout_ms", 10_000)?
            .set_default("provider.sync_page_size", 100)?
            .set_default("billing.default_rate_multiplier", 2.0)?
            .set_default("billing.ledger_grace_period_secs", 300)?
            .set_default("billing.audit_interval_secs", 60)?
            .set_default("billing.rate_cache_ttl_secs", 60)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with DIALER_ prefix
            .add_source(
                Environment::with_prefix("DIALER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;

        // Conventional names used by deployment tooling
        if let Ok(url) = env::var("DATABASE_URL") {
            app.database.url = url;
        }
        if app.redis.url.is_none() {
            app.redis.url = env::var("REDIS_URL").ok();
        }

        Ok(app)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("DIALER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.default_rate_multiplier, 2.0);
        assert_eq!(config.ledger_grace_period_secs, 300);
        assert_eq!(config.fallback_multiplier(), Decimal::TWO);
    }

    #[test]
    fn test_fallback_multiplier_rejects_non_positive() {
        let config = BillingConfig {
            default_rate_multiplier: -1.0,
            ..Default::default()
        };
        assert_eq!(config.fallback_multiplier(), Decimal::TWO);

        let config = BillingConfig {
            default_rate_multiplier: 1.5,
            ..Default::default()
        };
        assert_eq!(config.fallback_multiplier(), Decimal::new(15, 1));
    }

    #[test]
    fn test_default_provider_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.base_url, "https://api.vapi.ai");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.sync_page_size, 100);
    }
}
