//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Which pool the listener draws backends from.
    pub service_class: String,

    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Backend pools keyed by service class. Order within a pool is significant.
    pub pools: BTreeMap<String, Vec<String>>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Relay tuning.
    pub relay: RelayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(
            "plain".to_string(),
            vec!["127.0.0.1:8000".to_string(), "127.0.0.1:8001".to_string()],
        );
        pools.insert(
            "streaming".to_string(),
            vec!["127.0.0.1:8002".to_string(), "127.0.0.1:8003".to_string()],
        );

        Self {
            service_class: "plain".to_string(),
            listener: ListenerConfig::default(),
            pools,
            timeouts: TimeoutConfig::default(),
            relay: RelayConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8004").
    pub bind_address: String,

    /// Maximum concurrent sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8004".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for session setup and teardown.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend dial timeout in seconds.
    pub connect_secs: u64,

    /// How long the remaining relay may keep running once the other direction ended.
    pub half_close_grace_ms: u64,

    /// How long shutdown waits for live sessions before giving up.
    pub shutdown_drain_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn half_close_grace(&self) -> Duration {
        Duration::from_millis(self.half_close_grace_ms)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            half_close_grace_ms: 5_000,
            shutdown_drain_secs: 30,
        }
    }
}

/// Relay tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Per-direction copy buffer in bytes.
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { buffer_size: 8192 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: BalancerConfig = toml::from_str(
            r#"
            service_class = "streaming"
            "#,
        )
        .unwrap();

        assert_eq!(config.service_class, "streaming");
        assert_eq!(config.listener.bind_address, "127.0.0.1:8004");
        assert_eq!(config.pools["streaming"], vec!["127.0.0.1:8002", "127.0.0.1:8003"]);
        assert_eq!(config.relay.buffer_size, 8192);
    }

    #[test]
    fn explicit_pools_replace_defaults() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [pools]
            edge = ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pools.len(), 1);
        assert_eq!(config.pools["edge"].len(), 3);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
