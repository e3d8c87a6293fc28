// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// What to do when the cache store cannot be reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutagePolicy {
    /// Treat reads as misses and skip writes
    #[default]
    Degrade,
    /// Surface the storage error to the caller
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub outage_policy: CacheOutagePolicy,
}

fn default_key_prefix() -> String {
    "fsf:scene:".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            outage_policy: CacheOutagePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Timeout used when a subscription does not set its own
    pub default_timeout_seconds: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    #[serde(default)]
    pub backoff_jitter: f64,
}

impl DeliveryConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 10,
            backoff_base_ms: crate::retry::DEFAULT_BASE_DELAY_MS,
            backoff_max_ms: crate::retry::DEFAULT_MAX_DELAY_MS,
            backoff_jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone cron expressions are evaluated in
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

/// A named HTTP JSON data source registered at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,
}

fn default_source_timeout() -> u64 {
    15
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.cache.key_prefix.is_empty() {
            return Err("Cache key_prefix cannot be empty".to_string());
        }

        if self.delivery.default_timeout_seconds == 0 {
            return Err("Delivery default_timeout_seconds must be greater than 0".to_string());
        }
        if self.delivery.backoff_base_ms > self.delivery.backoff_max_ms {
            return Err("Delivery backoff_base_ms cannot exceed backoff_max_ms".to_string());
        }

        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "Unknown scheduler timezone: {}",
                self.scheduler.timezone
            ));
        }

        if self.observability.metrics_port == 0 {
            return Err("Metrics port must be greater than 0".to_string());
        }

        for source in &self.data_sources {
            if source.name.is_empty() || source.url.is_empty() {
                return Err("Data sources need a name and a url".to_string());
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/fsf".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            cache: CacheConfig::default(),
            delivery: DeliveryConfig::default(),
            scheduler: SchedulerConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
            data_sources: Vec::new(),
        }
    }
}
