//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zwgate_settings::GatewaySettings;

use crate::protocol::{MAX_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
use crate::registry::RegistryConfig;

/// Configuration for the gateway server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Liveness probe interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    pub min_schema_version: u32,
    pub max_schema_version: u32,
    /// Frames buffered per session before events are dropped.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_ms: 30_000,
            min_schema_version: MIN_SCHEMA_VERSION,
            max_schema_version: MAX_SCHEMA_VERSION,
            outbound_queue_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Take listener, heartbeat and schema settings from loaded settings.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            heartbeat_interval_ms: settings.server.heartbeat_interval_ms,
            min_schema_version: settings.schema.min_version,
            max_schema_version: settings.schema.max_version,
            outbound_queue_capacity: settings.server.outbound_queue_capacity,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            min_schema_version: self.min_schema_version,
            max_schema_version: self.max_schema_version,
            outbound_queue_capacity: self.outbound_queue_capacity,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
