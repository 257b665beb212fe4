//! # zwgate-telemetry
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`] built
//! from the configured level and per-module overrides (`RUST_LOG` wins when
//! set), feeding either a JSON or a human-readable fmt layer.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module overrides (e.g. `zwgate_server::websocket` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// One JSON object per line instead of the pretty format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from the string form used in settings files.
    pub fn from_names<'a, I>(level: &str, modules: I, json: bool) -> Result<Self, TelemetryError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let module_levels = modules
            .into_iter()
            .map(|(module, lvl)| parse_level(lvl).map(|l| (module.to_string(), l)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            log_level: parse_level(level)?,
            module_levels,
            json,
        })
    }

    /// The directive string handed to [`EnvFilter`].
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_string().to_lowercase());
        }
        filter
    }
}

pub fn parse_level(name: &str) -> Result<Level, TelemetryError> {
    Level::from_str(name.trim()).map_err(|_| TelemetryError::UnknownLevel(name.to_string()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_info() {
        assert_eq!(TelemetryConfig::default().filter_directives(), "info");
    }

    #[test]
    fn module_levels_append_directives() {
        let config = TelemetryConfig::from_names(
            "warn",
            [("zwgate_server::websocket", "debug"), ("tower_http", "error")],
            true,
        )
        .unwrap();
        assert_eq!(
            config.filter_directives(),
            "warn,zwgate_server::websocket=debug,tower_http=error"
        );
        assert!(config.json);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = TelemetryConfig::from_names("loud", std::iter::empty(), false).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownLevel(ref l) if l == "loud"));
    }

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" trace ").unwrap(), Level::TRACE);
    }
}
