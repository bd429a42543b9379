use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables shared by ingestors, executors and the pipeline.
///
/// Every field can be overridden from the environment, see [`EngineSettings::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Rows per extraction/load batch
    pub batch_size: usize,
    /// Documents sampled for schema inference
    pub sample_size: usize,
    /// Throughput assumption behind plan duration estimates
    pub estimated_rows_per_minute: u64,
    pub cache_ttl_secs: u64,
    pub connect_timeout_secs: u64,
    pub server_selection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub pool_max_connections: u32,
    pub pool_min_connections: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            sample_size: 1000,
            estimated_rows_per_minute: 1000,
            cache_ttl_secs: 300,
            connect_timeout_secs: 10,
            server_selection_timeout_secs: 5,
            idle_timeout_secs: 30,
            pool_max_connections: 10,
            pool_min_connections: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl EngineSettings {
    /// Defaults overridden by `DATALINK_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_or("DATALINK_BATCH_SIZE", defaults.batch_size).max(1),
            sample_size: env_or("DATALINK_SAMPLE_SIZE", defaults.sample_size).max(1),
            estimated_rows_per_minute: env_or(
                "DATALINK_ROWS_PER_MINUTE",
                defaults.estimated_rows_per_minute,
            )
            .max(1),
            cache_ttl_secs: env_or("DATALINK_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            connect_timeout_secs: env_or(
                "DATALINK_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            server_selection_timeout_secs: env_or(
                "DATALINK_SERVER_SELECTION_TIMEOUT_SECS",
                defaults.server_selection_timeout_secs,
            ),
            idle_timeout_secs: env_or("DATALINK_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            pool_max_connections: env_or("DATALINK_POOL_MAX", defaults.pool_max_connections)
                .max(1),
            pool_min_connections: env_or("DATALINK_POOL_MIN", defaults.pool_min_connections),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.batch_size, 1000);
        assert_eq!(settings.sample_size, 1000);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.server_selection_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let settings: EngineSettings = serde_json::from_str(r#"{"batch_size": 50}"#).unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.pool_max_connections, 10);
    }
}
