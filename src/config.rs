//! Configuration management for the journey planner
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::PlannerError;
use crate::models::CurrencyCode;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Legacy variable holding the commercial rate provider key
pub const LEGACY_API_KEY_VAR: &str = "EXCHANGERATE_API_KEY";

/// Root configuration structure for the journey planner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Exchange rate configuration
    #[serde(default)]
    pub currency: CurrencyConfig,
    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Exchange rate provider and cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Reporting currency for journeys that do not pick one
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Key for the commercial provider; the free provider is used without it
    pub api_key: Option<String>,
    #[serde(default = "default_primary_base_url")]
    pub primary_base_url: String,
    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,
    #[serde(default = "default_primary_timeout")]
    pub primary_timeout_seconds: u32,
    #[serde(default = "default_fallback_timeout")]
    pub fallback_timeout_seconds: u32,
    /// Retries for transient upstream failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Rate cache document location
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    /// Snapshot lifetime; also the auto refresh interval
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_minutes: u32,
    /// Treat snapshots older than the TTL as cache misses
    #[serde(default)]
    pub enforce_ttl: bool,
    /// Periodically refresh `refresh_bases` while serving
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    #[serde(default = "default_refresh_bases")]
    pub refresh_bases: Vec<String>,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per table
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
}

// Default value functions
fn default_currency() -> String {
    "PLN".to_string()
}

fn default_primary_base_url() -> String {
    "https://v6.exchangerate-api.com/v6".to_string()
}

fn default_fallback_base_url() -> String {
    "https://api.exchangerate.host".to_string()
}

fn default_primary_timeout() -> u32 {
    15
}

fn default_fallback_timeout() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_cache_file() -> String {
    "data/exchange_rates.json".to_string()
}

fn default_cache_ttl() -> u32 {
    60
}

fn default_auto_refresh() -> bool {
    true
}

fn default_refresh_bases() -> Vec<String> {
    vec![default_currency()]
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_request_timeout() -> u32 {
    30
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            api_key: None,
            primary_base_url: default_primary_base_url(),
            fallback_base_url: default_fallback_base_url(),
            primary_timeout_seconds: default_primary_timeout(),
            fallback_timeout_seconds: default_fallback_timeout(),
            max_retries: default_max_retries(),
            cache_file: default_cache_file(),
            cache_ttl_minutes: default_cache_ttl(),
            enforce_ttl: false,
            auto_refresh: default_auto_refresh(),
            refresh_bases: default_refresh_bases(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl CurrencyConfig {
    /// Parsed default reporting currency
    pub fn default_currency_code(&self) -> crate::Result<CurrencyCode> {
        CurrencyCode::parse(&self.default_currency)
    }

    /// Parsed refresh bases
    pub fn refresh_base_codes(&self) -> crate::Result<Vec<CurrencyCode>> {
        self.refresh_bases
            .iter()
            .map(|code| CurrencyCode::parse(code))
            .collect()
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.cache_ttl_minutes) * 60)
    }

    /// TTL applied on the read path, if enforcement is enabled
    #[must_use]
    pub fn enforced_ttl(&self) -> Option<Duration> {
        self.enforce_ttl.then(|| self.cache_ttl())
    }
}

impl PlannerConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from file if path is provided or use default location
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // JOURNEY_PLANNER__CURRENCY__API_KEY=... style overrides
        builder = builder.add_source(
            Environment::with_prefix("JOURNEY_PLANNER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: PlannerConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        if config.currency.api_key.is_none() {
            config.currency.api_key = std::env::var(LEGACY_API_KEY_VAR).ok();
        }

        // Apply defaults for missing values
        config.apply_defaults();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("journey-planner").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self
            .currency
            .api_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            self.currency.api_key = None;
        }
        if self.currency.default_currency.is_empty() {
            self.currency.default_currency = default_currency();
        }
        if self.currency.primary_base_url.is_empty() {
            self.currency.primary_base_url = default_primary_base_url();
        }
        if self.currency.fallback_base_url.is_empty() {
            self.currency.fallback_base_url = default_fallback_base_url();
        }
        if self.currency.primary_timeout_seconds == 0 {
            self.currency.primary_timeout_seconds = default_primary_timeout();
        }
        if self.currency.fallback_timeout_seconds == 0 {
            self.currency.fallback_timeout_seconds = default_fallback_timeout();
        }
        if self.currency.cache_file.is_empty() {
            self.currency.cache_file = default_cache_file();
        }
        if self.currency.cache_ttl_minutes == 0 {
            self.currency.cache_ttl_minutes = default_cache_ttl();
        }
        if self.storage.data_dir.is_empty() {
            self.storage.data_dir = default_data_dir();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_currencies()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_currencies(&self) -> Result<()> {
        self.currency.default_currency_code().map_err(|e| {
            PlannerError::config(format!("Invalid default currency: {e}"))
        })?;
        self.currency.refresh_base_codes().map_err(|e| {
            PlannerError::config(format!("Invalid refresh base: {e}"))
        })?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.currency.primary_timeout_seconds > 120 || self.currency.fallback_timeout_seconds > 120
        {
            return Err(
                PlannerError::config("Rate provider timeout cannot exceed 120 seconds").into(),
            );
        }

        if self.currency.max_retries > 10 {
            return Err(PlannerError::config("Rate provider max retries cannot exceed 10").into());
        }

        if self.currency.cache_ttl_minutes > 7 * 24 * 60 {
            return Err(PlannerError::config("Cache TTL cannot exceed one week").into());
        }

        if self.server.request_timeout_seconds > 300 {
            return Err(PlannerError::config("Request timeout cannot exceed 300 seconds").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(PlannerError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(PlannerError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for url in [
            &self.currency.primary_base_url,
            &self.currency.fallback_base_url,
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PlannerError::config(format!(
                    "Rate provider URL must be a valid HTTP or HTTPS URL, got '{url}'"
                ))
                .into());
            }
        }

        Ok(())
    }
}
