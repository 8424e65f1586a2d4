use anyhow::{Context, Result};
use serde::Deserialize;

// Re-export existing config types
pub use crate::log::{NatsConfig, TopicsConfig};

/// Environment variable naming the TOML configuration file
pub const CONFIG_PATH_ENV: &str = "TELEMETRY_CONFIG";

/// Complete telemetry service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

/// Which log implementation backs the topics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    #[default]
    Nats,
    Memory,
}

/// Log transport configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub backend: LogBackend,
    #[serde(flatten)]
    pub nats: NatsConfig,
}

/// Ingestion HTTP endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
        }
    }
}

/// Snapshot aggregator loop
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_aggregator_consumer")]
    pub consumer_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bounded wait of one pull, also the shutdown check interval
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Rebuild snapshots from the start of the sensor log on startup
    #[serde(default = "default_enabled")]
    pub replay_on_start: bool,
}

fn default_aggregator_consumer() -> String {
    "snapshot-aggregator".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            consumer_name: default_aggregator_consumer(),
            batch_size: default_batch_size(),
            poll_timeout_ms: default_poll_timeout_ms(),
            replay_on_start: default_enabled(),
        }
    }
}

/// Hub event analyzer loop
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_analyzer_consumer")]
    pub consumer_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// SQLite file holding the device/scenario registry
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_analyzer_consumer() -> String {
    "hub-event-analyzer".to_string()
}

fn default_database_path() -> String {
    "telemetry.db".to_string()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            consumer_name: default_analyzer_consumer(),
            batch_size: default_batch_size(),
            poll_timeout_ms: default_poll_timeout_ms(),
            database_path: default_database_path(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<TelemetryConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: TelemetryConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

/// Load from the file named by `TELEMETRY_CONFIG`, or defaults when unset
pub fn load_from_env() -> Result<TelemetryConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(&path),
        Err(_) => Ok(TelemetryConfig::default()),
    }
}
