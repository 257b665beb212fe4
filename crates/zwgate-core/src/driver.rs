use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::DriverError;
use crate::events::SequencedEvent;
use crate::logging::{LogConfig, LogConfigUpdate, LogEntry};
use crate::model::{DriverSnapshot, InclusionGrant, InclusionOptions, NodeId, NodeState, ValueId};

/// Decisions the driver needs from a user while including a secure node.
///
/// Each call may wait indefinitely. `None` means the user cancelled (or the
/// decision was discarded), after which the driver aborts the inclusion.
#[async_trait]
pub trait InclusionUserCallbacks: Send + Sync {
    async fn grant_security_classes(&self, requested: InclusionGrant) -> Option<InclusionGrant>;

    /// `dsk` is the device key with the first five digits masked out. The
    /// answer is those five digits.
    async fn validate_dsk_and_enter_pin(&self, dsk: String) -> Option<String>;

    /// The driver gave up on the running inclusion.
    fn abort(&self);
}

/// The device driver the gateway exposes.
///
/// Reads are synchronous snapshots. Anything that talks to the radio is
/// async and may take seconds.
#[async_trait]
pub trait Driver: Send + Sync {
    fn driver_version(&self) -> &str;
    fn home_id(&self) -> Option<u32>;

    fn state(&self) -> DriverSnapshot;
    fn node(&self, node_id: NodeId) -> Option<NodeState>;

    /// A snapshot from [`Driver::state`] includes the effect of every event
    /// up to its `event_seq` and of none after it.
    fn subscribe(&self) -> broadcast::Receiver<SequencedEvent>;
    fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry>;

    fn log_config(&self) -> LogConfig;
    /// Returns the configuration in effect after the update.
    fn update_log_config(&self, update: &LogConfigUpdate) -> LogConfig;

    fn is_statistics_enabled(&self) -> bool;
    async fn enable_statistics(
        &self,
        application_name: &str,
        application_version: &str,
    ) -> Result<(), DriverError>;
    async fn disable_statistics(&self) -> Result<(), DriverError>;

    async fn begin_inclusion(
        &self,
        options: InclusionOptions,
        callbacks: Arc<dyn InclusionUserCallbacks>,
    ) -> Result<bool, DriverError>;
    async fn stop_inclusion(&self) -> Result<bool, DriverError>;
    async fn begin_exclusion(&self) -> Result<bool, DriverError>;
    async fn stop_exclusion(&self) -> Result<bool, DriverError>;

    async fn begin_healing_network(&self) -> Result<bool, DriverError>;
    async fn stop_healing_network(&self) -> Result<bool, DriverError>;
    async fn remove_failed_node(&self, node_id: NodeId) -> Result<(), DriverError>;

    async fn set_value(
        &self,
        node_id: NodeId,
        value_id: &ValueId,
        value: serde_json::Value,
    ) -> Result<bool, DriverError>;
    async fn refresh_info(&self, node_id: NodeId) -> Result<(), DriverError>;
    async fn ping(&self, node_id: NodeId) -> Result<bool, DriverError>;

    fn set_name(&self, node_id: NodeId, name: String) -> Result<(), DriverError>;
    fn set_location(&self, node_id: NodeId, location: String) -> Result<(), DriverError>;
}
