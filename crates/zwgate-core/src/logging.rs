//! Driver log configuration and log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Driver log severity, most severe first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Http,
    Verbose,
    Debug,
    Silly,
}

impl LogLevel {
    /// Whether a line at `self` passes a filter configured at `threshold`.
    pub fn passes(self, threshold: LogLevel) -> bool {
        self <= threshold
    }
}

/// The driver's logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    pub enabled: bool,
    pub level: LogLevel,
    pub log_to_file: bool,
    pub filename: String,
    pub force_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            log_to_file: false,
            filename: "zwave_%DATE%.log".into(),
            force_console: false,
        }
    }
}

/// Partial update applied by `update_log_config`. Absent keys are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_to_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_console: Option<bool>,
}

impl LogConfig {
    /// Apply a partial update, returning whether anything changed.
    pub fn apply(&mut self, update: &LogConfigUpdate) -> bool {
        let before = self.clone();
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(log_to_file) = update.log_to_file {
            self.log_to_file = log_to_file;
        }
        if let Some(filename) = &update.filename {
            self.filename.clone_from(filename);
        }
        if let Some(force_console) = update.force_console {
            self.force_console = force_console;
        }
        *self != before
    }
}

/// Where a log line originated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContext {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<u8>,
}

/// One driver log line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub label: String,
    pub direction: String,
    pub primary_tags: Option<String>,
    pub secondary_tags: Option<String>,
    pub message: Vec<String>,
    pub context: LogContext,
}

impl LogEntry {
    pub fn new(level: LogLevel, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            label: label.into(),
            direction: "  ".into(),
            primary_tags: None,
            secondary_tags: None,
            message: message.into().lines().map(str::to_owned).collect(),
            context: LogContext {
                source: "driver".into(),
                ..LogContext::default()
            },
        }
    }

    #[must_use]
    pub fn for_node(mut self, node_id: u16) -> Self {
        self.context.node_id = Some(node_id);
        self.context.source = "node".into();
        self
    }

    pub fn is_multiline(&self) -> bool {
        self.message.len() > 1
    }

    /// Single-string rendering the way the driver's console transport prints it.
    pub fn formatted(&self) -> String {
        let mut out = format!(
            "{} {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.label,
            self.direction
        );
        if let Some(tags) = &self.primary_tags {
            out.push_str(tags);
            out.push(' ');
        }
        out.push_str(&self.message.join("\n"));
        if let Some(tags) = &self.secondary_tags {
            out.push(' ');
            out.push_str(tags);
        }
        out
    }
}
