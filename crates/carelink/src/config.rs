//! Configuration loading

use std::path::Path;

use anyhow::{Context, Result};
use carelink_core::RepositoryConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Cache configuration for the patient and referral repositories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_listing_refresh_ms")]
    pub listing_refresh_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            channel_capacity: default_channel_capacity(),
            listing_refresh_ms: default_listing_refresh_ms(),
        }
    }
}

impl CacheConfig {
    /// Build repository settings, clamping values the runtime cannot use
    pub fn repository_config(&self) -> RepositoryConfig {
        let ttl_secs = if self.ttl_secs == 0 {
            warn!("cache.ttl_secs is 0, using 1 second");
            1
        } else {
            self.ttl_secs
        };
        let refresh_ms = if self.listing_refresh_ms == 0 {
            warn!("cache.listing_refresh_ms is 0, using 1 millisecond");
            1
        } else {
            self.listing_refresh_ms
        };

        RepositoryConfig::default()
            .with_ttl(
                i64::try_from(ttl_secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .unwrap_or(chrono::Duration::MAX),
            )
            .with_channel_capacity(self.channel_capacity)
            .with_listing_refresh_interval(std::time::Duration::from_millis(refresh_ms))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions

fn default_db_path() -> String {
    "./data/carelink.db".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_channel_capacity() -> usize {
    256
}

fn default_listing_refresh_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// SQLite connection URL for the configured path
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database.path)
    }
}
