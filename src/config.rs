//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::chunk::ChunkUnit;
use crate::executor::InfluxSettings;
use crate::fetch::FetchOptions;
use crate::time::parse_zone;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub influx: InfluxConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// InfluxDB connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// API token; prompted for when absent
    #[serde(default)]
    pub token: Option<String>,

    /// Organization; prompted for when absent
    #[serde(default)]
    pub org: Option<String>,

    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            org: None,
            bucket: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Fetch defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// IANA zone for chunk boundaries and output datetimes
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub chunk_unit: ChunkUnit,

    /// Start used by `update` for measurements with no prior data
    #[serde(default = "default_start")]
    pub default_start: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Write fetched chunks to the cache
    #[serde(default = "default_save")]
    pub save: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_start() -> String {
    "2020-01-01".to_string()
}

fn default_cache_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("fluxfetch").join("cache").to_string_lossy().to_string())
        .unwrap_or_else(|| "./fluxfetch_cache".to_string())
}

fn default_save() -> bool {
    true
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            chunk_unit: ChunkUnit::default(),
            default_start: default_start(),
            cache_dir: default_cache_dir(),
            save: default_save(),
        }
    }
}

impl FetchConfig {
    pub fn zone(&self) -> Result<Tz, ConfigError> {
        parse_zone(&self.timezone).map_err(|_| ConfigError::InvalidZone(self.timezone.clone()))
    }

    /// Cache directory with a leading `~` expanded
    pub fn cache_path(&self) -> PathBuf {
        match self.cache_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.cache_dir)),
            None => PathBuf::from(&self.cache_dir),
        }
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Asks the user for a credential missing from the configuration
pub trait CredentialPrompt {
    /// Returns `None` when the user gives no answer
    fn prompt(&self, name: &str, secret: bool) -> Option<String>;
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fluxfetch").join("config.toml")),
            Some(PathBuf::from("./fluxfetch.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // InfluxDB overrides
        if let Some(url) = var("INFLUX_URL") {
            self.influx.url = url;
        }
        if let Some(token) = var("INFLUX_TOKEN") {
            self.influx.token = Some(token);
        }
        if let Some(org) = var("INFLUX_ORG") {
            self.influx.org = Some(org);
        }
        if let Some(bucket) = var("INFLUX_BUCKET") {
            self.influx.bucket = Some(bucket);
        }

        // Fetch overrides
        if let Some(timezone) = var("FLUXFETCH_TIMEZONE") {
            self.fetch.timezone = timezone;
        }
        if let Some(unit) = var("FLUXFETCH_CHUNK_UNIT") {
            match unit.parse() {
                Ok(unit) => self.fetch.chunk_unit = unit,
                Err(e) => tracing::warn!("Ignoring FLUXFETCH_CHUNK_UNIT: {}", e),
            }
        }
        if let Some(cache_dir) = var("FLUXFETCH_CACHE_DIR") {
            self.fetch.cache_dir = cache_dir;
        }

        // Logging overrides
        if let Some(level) = var("FLUXFETCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("FLUXFETCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Connection settings, prompting for a missing token or org
    pub fn influx_settings(
        &self,
        prompt: Option<&dyn CredentialPrompt>,
    ) -> Result<InfluxSettings, ConfigError> {
        let token = credential(self.influx.token.as_deref(), "token", true, prompt)?;
        let org = credential(self.influx.org.as_deref(), "org", false, prompt)?;

        Ok(InfluxSettings {
            url: self.influx.url.clone(),
            token,
            org,
            timeout_secs: self.influx.timeout_secs,
        })
    }

    /// Fetch options from the configured bucket, zone and cache
    pub fn fetch_options(&self) -> Result<FetchOptions, ConfigError> {
        let bucket = self
            .influx
            .bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential("bucket".to_string()))?;

        let mut options = FetchOptions::new(bucket, self.fetch.zone()?).unit(self.fetch.chunk_unit);
        options.save = self.fetch.save;
        options.output_dir = self.fetch.cache_path();
        Ok(options)
    }
}

fn credential(
    configured: Option<&str>,
    name: &str,
    secret: bool,
    prompt: Option<&dyn CredentialPrompt>,
) -> Result<String, ConfigError> {
    if let Some(value) = configured.filter(|v| !v.is_empty()) {
        return Ok(value.to_string());
    }
    prompt
        .and_then(|p| p.prompt(name, secret))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(name.to_string()))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing InfluxDB {0}: set it in the config file or environment")]
    MissingCredential(String),

    #[error("Invalid timezone in config: '{0}'")]
    InvalidZone(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# fluxfetch Configuration
#
# Environment variables override these settings:
# - INFLUX_URL, INFLUX_TOKEN, INFLUX_ORG, INFLUX_BUCKET
# - FLUXFETCH_TIMEZONE
# - FLUXFETCH_CHUNK_UNIT
# - FLUXFETCH_CACHE_DIR
# - FLUXFETCH_LOG_LEVEL
# - FLUXFETCH_LOG_FORMAT

[influx]
# InfluxDB 2.x server URL
url = "http://localhost:8086"

# API token and organization (prompted for when omitted)
# token = ""
# org = ""

# Bucket to query
bucket = "home"

# Request timeout in seconds
timeout_secs = 60

[fetch]
# IANA timezone used for chunk boundaries and output datetimes
timezone = "UTC"

# Chunk size: day, week or month
chunk_unit = "month"

# Where `update` starts for measurements with no cached data
default_start = "2020-01-01"

# Directory for cached chunks
cache_dir = "~/.local/share/fluxfetch/cache"

# Cache every fetched chunk
save = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
