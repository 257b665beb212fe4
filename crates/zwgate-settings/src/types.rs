//! Settings type definitions.
//!
//! Every struct is `#[serde(default)]` so a settings file only needs the
//! keys it changes. Keys are camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    pub server: ServerSettings,
    pub schema: SchemaSettings,
    pub logging: LoggingSettings,
    pub simulation: SimulationSettings,
}

impl GatewaySettings {
    /// Cross-field checks that serde cannot express.
    ///
    /// `highest_known` is the newest schema version the running server can
    /// render.
    pub fn validate(&self, highest_known: u32) -> Result<()> {
        let SchemaSettings {
            min_version,
            max_version,
        } = self.schema;
        if max_version > highest_known {
            return Err(SettingsError::InvalidValue(format!(
                "schema.maxVersion {max_version} exceeds the highest supported version {highest_known}"
            )));
        }
        if min_version > max_version {
            return Err(SettingsError::InvalidValue(format!(
                "schema.minVersion {min_version} exceeds schema.maxVersion {max_version}"
            )));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.server.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundQueueCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Liveness probe interval.
    pub heartbeat_interval_ms: u64,
    /// Frames buffered per session before events are dropped.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            heartbeat_interval_ms: 30_000,
            outbound_queue_capacity: 1024,
        }
    }
}

/// Range of client schema versions the gateway accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaSettings {
    pub min_version: u32,
    pub max_version: u32,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            min_version: 0,
            max_version: 33,
        }
    }
}

/// Process log output (not the driver's log channel).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"zwgate_server::websocket": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationSettings {
    /// Demo nodes seeded next to the controller.
    pub node_count: u16,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self { node_count: 4 }
    }
}
