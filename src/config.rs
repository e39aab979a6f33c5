use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4319,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Ring buffer capacities and query limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub trace_capacity: usize,
    pub log_capacity: usize,
    pub metric_capacity: usize,
    /// Pending change pings per subscriber; extra pings collapse
    pub subscriber_buffer: usize,
    pub default_query_limit: usize,
    pub max_query_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            trace_capacity: 10_000,
            log_capacity: 50_000,
            metric_capacity: 50_000,
            subscriber_buffer: 1,
            default_query_limit: 1_000,
            max_query_limit: 10_000,
        }
    }
}

/// Live feed defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub trace_backfill: usize,
    pub log_backfill: usize,
    pub metric_backfill: usize,
    pub keepalive_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            trace_backfill: 50,
            log_backfill: 100,
            metric_backfill: 50,
            keepalive_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

/// Load configuration from `path` (optional) layered under `TELEMETRY_HUB__*` env vars
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("TELEMETRY_HUB")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    let storage = &cfg.storage;
    for (name, capacity) in [
        ("trace_capacity", storage.trace_capacity),
        ("log_capacity", storage.log_capacity),
        ("metric_capacity", storage.metric_capacity),
    ] {
        if capacity == 0 {
            anyhow::bail!("storage.{} must be greater than 0", name);
        }
    }

    if storage.subscriber_buffer == 0 {
        anyhow::bail!("storage.subscriber_buffer must be greater than 0");
    }

    if storage.default_query_limit == 0 {
        anyhow::bail!("storage.default_query_limit must be greater than 0");
    }

    if storage.default_query_limit > storage.max_query_limit {
        anyhow::bail!(
            "storage.default_query_limit ({}) exceeds storage.max_query_limit ({})",
            storage.default_query_limit,
            storage.max_query_limit
        );
    }

    if cfg.stream.keepalive_seconds == 0 {
        anyhow::bail!("stream.keepalive_seconds must be greater than 0");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid log_format '{}': expected 'text' or 'json'", other),
    }

    if !cfg.metrics.endpoint.starts_with('/') {
        anyhow::bail!(
            "metrics.endpoint must start with '/': {}",
            cfg.metrics.endpoint
        );
    }

    Ok(())
}
