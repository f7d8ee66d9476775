//! Service configuration shared by the calbook binaries.
//!
//! Loaded from `~/.config/calbook/config.toml` (or `--config <path>`), then
//! overridden by `CALBOOK__<SECTION>__<KEY>` environment variables. Every
//! key is optional.

use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_AMQP_URI, DEFAULT_DATABASE_PATH, DEFAULT_EXCHANGE, DEFAULT_LISTEN, DEFAULT_PREFETCH,
    DEFAULT_QUEUE, DEFAULT_ROUTING_KEY, DEFAULT_WORKERS,
};
use crate::error::{CalendarError, CalendarResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Fallback filter when `RUST_LOG` is unset (e.g. "info", "calbook_broker=debug").
    pub log_level: String,
    pub log_format: LogFormat,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub broker: BrokerConfig,
    pub backoff: BackoffConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub uri: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Unacknowledged deliveries a consumer may hold at once.
    pub prefetch: u16,
    /// Concurrent workers on the consumer side.
    pub workers: usize,
    pub consumer_tag: String,
}

/// Reconnect schedule. Durations are human strings such as "1s" or "1m".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(deserialize_with = "human_duration")]
    pub initial: Duration,
    pub multiplier: f64,
    #[serde(deserialize_with = "human_duration")]
    pub max_interval: Duration,
    #[serde(deserialize_with = "human_duration")]
    pub max_elapsed: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(deserialize_with = "human_duration")]
    pub interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            broker: BrokerConfig::default(),
            backoff: BackoffConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            uri: DEFAULT_AMQP_URI.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            routing_key: DEFAULT_ROUTING_KEY.to_string(),
            prefetch: DEFAULT_PREFETCH,
            workers: DEFAULT_WORKERS,
            consumer_tag: String::new(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(15),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn config_path() -> CalendarResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalendarError::Config("Could not determine config directory".into()))?
            .join("calbook");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location when
    /// `None`. An explicitly given file must exist; the default one may not.
    pub fn load(path: Option<&Path>) -> CalendarResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };

        let config: ServiceConfig = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(Environment::with_prefix("CALBOOK").prefix_separator("__").separator("__"))
            .build()
            .map_err(|e| CalendarError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalendarError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CalendarResult<()> {
        if self.broker.workers == 0 {
            return Err(CalendarError::Config("broker.workers must be at least 1".into()));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(CalendarError::Config(format!(
                "backoff.multiplier must be at least 1.0 (got {})",
                self.backoff.multiplier
            )));
        }
        if self.scheduler.interval.is_zero() {
            return Err(CalendarError::Config("scheduler.interval must not be zero".into()));
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database_path.to_string_lossy()).into_owned();
        PathBuf::from(expanded)
    }
}

fn human_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
