//! Configuration for Dialwave

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "DIALWAVE_CONFIG";

/// Prefix for environment overrides (`DIALWAVE__SCHEDULER__CONCURRENCY=4`)
pub const ENV_PREFIX: &str = "DIALWAVE";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Campaign scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Call execution provider configuration
    #[serde(default)]
    pub dialer: DialerConfig,

    /// Campaign completion notifications
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Inbound provider webhooks
    #[serde(default)]
    pub webhooks: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Campaign scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable the background sweep
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    /// Seconds between scheduler ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Maximum due queue items fetched per campaign per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Number of dispatch workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the bounded dispatch queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Age after which an in-progress attempt without an outcome is recycled
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_interval_secs: default_tick_interval(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            stuck_after_secs: default_stuck_after(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    100
}

fn default_concurrency() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    256
}

fn default_stuck_after() -> u64 {
    30 * 60 // 30 minutes
}

/// Call execution provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    /// Provider dispatch endpoint. When unset, dispatches are only logged.
    pub endpoint: Option<String>,

    /// Bearer token for the provider
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_dialer_timeout")]
    pub timeout_secs: u64,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_dialer_timeout(),
        }
    }
}

fn default_dialer_timeout() -> u64 {
    10
}

/// Campaign completion notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving campaign completion events
    pub webhook_url: Option<String>,

    /// Shared secret used to sign completion events
    pub secret: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            secret: None,
            timeout_secs: default_notification_timeout(),
        }
    }
}

fn default_notification_timeout() -> u64 {
    5
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for HMAC-SHA256 signatures on call outcome callbacks
    pub outcome_secret: Option<String>,
}

impl Config {
    /// Load configuration from a file, layered with environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from environment and file
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&path));
        }

        // Try to load from default locations
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/dialwave/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
