//! Configuration module for threatwire.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, ThreatwireError};

/// Web server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used when building verification/management links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timezone for formatting timestamps in outbound digests (e.g., "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            timezone: default_timezone(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/threatwire.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path (empty = console only).
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

/// Feed ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Interval between ingestion runs in seconds.
    #[serde(default = "default_ingest_interval")]
    pub interval_secs: u64,
    /// Lookback window in days for live ingestion runs.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Lookback window in days for the initial historical backfill.
    #[serde(default = "default_backfill_days")]
    pub backfill_lookback_days: i64,
    /// Base endpoint of the page-scraping API (prepended to the target URL).
    #[serde(default = "default_scrape_endpoint")]
    pub scrape_endpoint: String,
    /// Optional API key for the scraping API.
    #[serde(default)]
    pub scrape_api_key: String,
}

fn default_ingest_interval() -> u64 {
    3600
}

fn default_lookback_days() -> i64 {
    7
}

fn default_backfill_days() -> i64 {
    30
}

fn default_scrape_endpoint() -> String {
    "https://r.jina.ai".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ingest_interval(),
            lookback_days: default_lookback_days(),
            backfill_lookback_days: default_backfill_days(),
            scrape_endpoint: default_scrape_endpoint(),
            scrape_api_key: String::new(),
        }
    }
}

/// Email transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Send endpoint of the email API.
    #[serde(default = "default_email_endpoint")]
    pub endpoint: String,
    /// API key for the email API.
    #[serde(default)]
    pub api_key: String,
    /// Sender address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Optional admin-notification relay endpoint (fire-and-forget).
    #[serde(default)]
    pub admin_relay_url: String,
}

fn default_email_endpoint() -> String {
    "https://api.resend.com/emails".to_string()
}

fn default_from_address() -> String {
    "alerts@threatwire.example".to_string()
}

fn default_from_name() -> String {
    "Threatwire Alerts".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: default_email_endpoint(),
            api_key: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            admin_relay_url: String::new(),
        }
    }
}

/// Notification scheduling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Interval between critical-alert runs in seconds.
    #[serde(default = "default_critical_interval")]
    pub critical_interval_secs: u64,
    /// Lookback window in hours for critical-alert runs.
    #[serde(default = "default_critical_lookback")]
    pub critical_lookback_hours: i64,
}

fn default_critical_interval() -> u64 {
    900
}

fn default_critical_lookback() -> i64 {
    3
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            critical_interval_secs: default_critical_interval(),
            critical_lookback_hours: default_critical_lookback(),
        }
    }
}

/// Rate limit configuration for the public endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum attempts per contact address within the window.
    #[serde(default = "default_address_max")]
    pub address_max: u32,
    /// Maximum attempts per request origin within the window.
    #[serde(default = "default_origin_max")]
    pub origin_max: u32,
    /// Window duration in seconds.
    #[serde(default = "default_rate_window")]
    pub window_secs: u64,
}

fn default_address_max() -> u32 {
    3
}

fn default_origin_max() -> u32 {
    10
}

fn default_rate_window() -> u64 {
    3600
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            address_max: default_address_max(),
            origin_max: default_origin_max(),
            window_secs: default_rate_window(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Web server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Feed ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Email transport settings.
    #[serde(default)]
    pub email: EmailConfig,
    /// Notification scheduling settings.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Rate limit settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ThreatwireError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ThreatwireError::Config("server.port must not be 0".into()));
        }
        if self.ingest.lookback_days <= 0 || self.ingest.backfill_lookback_days <= 0 {
            return Err(ThreatwireError::Config(
                "ingest lookback windows must be positive".into(),
            ));
        }
        if self.rate_limit.address_max == 0 || self.rate_limit.origin_max == 0 {
            return Err(ThreatwireError::Config(
                "rate_limit caps must be positive".into(),
            ));
        }
        Ok(())
    }
}
