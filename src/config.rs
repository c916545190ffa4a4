//! Service configuration.
//!
//! Loaded from a TOML file, with secrets and endpoints optionally overridden
//! from the environment (a `.env` file is honoured via `dotenv`). The file
//! format mirrors the runtime structure:
//!
//! ```toml
//! tick_interval_secs = 30
//! retention_cap = 1000
//!
//! [logging]
//! level = "info"
//!
//! [source]
//! kind = "http"
//! base_url = "http://gateway.local:8080/api"
//!
//! [alerts]
//! webhook_url = "http://bot.local/alerts"
//!
//! [[locations]]
//! name = "Mumbai"
//! region = "Maharashtra"
//! lat = 19.076
//! lng = 72.8777
//! population = 20000000
//! vulnerability_factor = 0.8
//! ```
//!
//! An empty `locations` list means "monitor the built-in city catalog".

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::alert::DeliveryPolicy;
use crate::history::DEFAULT_RETENTION_CAP;
use crate::ingest::RetryPolicy;
use crate::locations::{catalog_locations, validate_location};
use crate::logging::LogLevel;
use crate::model::Location;

/// Environment variables consulted by `ServiceConfig::apply_env`.
pub const ENV_GATEWAY_URL: &str = "FLOODWATCH_GATEWAY_URL";
pub const ENV_WEBHOOK_URL: &str = "FLOODWATCH_WEBHOOK_URL";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub tick_interval_secs: u64,
    /// Upper bound on locations processed concurrently within a tick.
    /// `None` means one task per location.
    pub max_concurrency: Option<usize>,
    pub retention_cap: usize,
    pub source_retries: u32,
    pub source_retry_backoff_ms: u64,
    pub sink_timeout_ms: u64,
    pub sink_retries: u32,
    /// Consecutive failed ticks before a location is reported degraded.
    pub degraded_after_failures: u32,
    pub stale_after_minutes: u64,
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    pub alerts: AlertsConfig,
    pub archive: ArchiveConfig,
    pub locations: Vec<Location>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            max_concurrency: None,
            retention_cap: DEFAULT_RETENTION_CAP,
            source_retries: 2,
            source_retry_backoff_ms: 250,
            sink_timeout_ms: 5_000,
            sink_retries: 0,
            degraded_after_failures: 5,
            stale_after_minutes: 10,
            logging: LoggingConfig::default(),
            source: SourceConfig::default(),
            alerts: AlertsConfig::default(),
            archive: ArchiveConfig::default(),
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Simulated,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Sensor gateway base URL, required for `kind = "http"`.
    pub base_url: Option<String>,
    /// Seed for the simulated source; entropy when absent.
    pub seed: Option<u64>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            base_url: None,
            seed: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Write every alert to the service log.
    pub log: bool,
    pub webhook_url: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Mirror assessments into PostgreSQL. Needs `DATABASE_URL`.
    pub enabled: bool,
    pub database_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Reads and validates a configuration file, then applies environment
/// overrides (including anything in `.env`).
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    dotenv::dotenv().ok();
    let mut config: ServiceConfig = toml::from_str(&text)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Parses configuration text without touching the environment.
pub fn parse_config(text: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

impl ServiceConfig {
    /// Overrides endpoints from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_GATEWAY_URL) {
            self.source.base_url = Some(url);
        }
        if let Some(url) = lookup(ENV_WEBHOOK_URL) {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.archive.database_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.tick_interval_secs == 0 {
            return invalid("tick_interval_secs must be positive");
        }
        if self.retention_cap == 0 {
            return invalid("retention_cap must be positive");
        }
        if self.max_concurrency == Some(0) {
            return invalid("max_concurrency must be positive when set");
        }
        if self.sink_timeout_ms == 0 {
            return invalid("sink_timeout_ms must be positive");
        }
        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        if self.source.kind == SourceKind::Http && self.source.base_url.is_none() {
            return invalid("source.base_url is required when source.kind = \"http\"");
        }

        let mut seen = std::collections::HashSet::new();
        for location in &self.locations {
            validate_location(location).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !seen.insert(location.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "location '{}' listed more than once",
                    location.name
                )));
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or(LogLevel::Info)
    }

    /// Configured locations, or the built-in catalog when none are listed.
    pub fn effective_locations(&self) -> Vec<Location> {
        if self.locations.is_empty() {
            catalog_locations()
        } else {
            self.locations.clone()
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            max_concurrency: self.max_concurrency,
            retention_cap: self.retention_cap,
            source_retry: RetryPolicy {
                retries: self.source_retries,
                backoff: Duration::from_millis(self.source_retry_backoff_ms),
            },
            delivery: DeliveryPolicy {
                timeout: Duration::from_millis(self.sink_timeout_ms),
                retries: self.sink_retries,
            },
            degraded_after_failures: self.degraded_after_failures,
            stale_after_minutes: self.stale_after_minutes,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

/// What the orchestrator needs at runtime, with units resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub max_concurrency: Option<usize>,
    pub retention_cap: usize,
    pub source_retry: RetryPolicy,
    pub delivery: DeliveryPolicy,
    pub degraded_after_failures: u32,
    pub stale_after_minutes: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        ServiceConfig::default().monitor_settings()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
