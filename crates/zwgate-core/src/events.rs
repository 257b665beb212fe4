//! Events pushed by the driver.
//!
//! The driver emits [`DriverEvent`]s on a broadcast channel. They carry
//! canonical state; rendering for a particular schema version happens in
//! the server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    ControllerStatistics, InterviewStage, NodeId, NodeState, NodeStatistics, RemoveNodeReason,
    ValueId, ValueMetadata,
};

/// Per-node outcome of a route rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStatus {
    Pending,
    Done,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    InclusionStarted { secure: bool },
    InclusionStopped,
    InclusionFailed,
    ExclusionStarted,
    ExclusionStopped,
    ExclusionFailed,
    NodeAdded { node: Box<NodeState>, low_security: bool },
    NodeRemoved { node: Box<NodeState>, reason: RemoveNodeReason },
    HealNetworkProgress { progress: BTreeMap<NodeId, RebuildStatus> },
    HealNetworkDone { result: BTreeMap<NodeId, RebuildStatus> },
    StatisticsUpdated(ControllerStatistics),
}

/// Arguments shared by value added/updated/removed/notification events.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueChange {
    pub id: ValueId,
    pub command_class_name: String,
    pub property_name: Option<String>,
    pub property_key_name: Option<String>,
    pub prev_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterviewFailure {
    pub error_message: String,
    pub is_final: bool,
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    ValueAdded(ValueChange),
    ValueUpdated(ValueChange),
    ValueRemoved(ValueChange),
    ValueNotification(ValueChange),
    MetadataUpdated { id: ValueId, metadata: ValueMetadata },
    Ready { node: Box<NodeState> },
    InterviewStarted,
    InterviewStageCompleted { stage: InterviewStage },
    InterviewCompleted,
    InterviewFailed(InterviewFailure),
    Wakeup,
    Sleep,
    Dead,
    Alive,
    StatisticsUpdated(NodeStatistics),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DriverEvent {
    AllNodesReady,
    Error { message: String },
    Controller(ControllerEvent),
    Node { node_id: NodeId, event: NodeEvent },
}

/// A driver event and its position in the driver's event stream.
///
/// Positions start at 1 and increase by one per event.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencedEvent {
    pub seq: u64,
    pub event: DriverEvent,
}

impl DriverEvent {
    pub fn node(node_id: NodeId, event: NodeEvent) -> Self {
        Self::Node { node_id, event }
    }

    /// The `source` field of the wire event.
    pub fn source(&self) -> &'static str {
        match self {
            Self::AllNodesReady | Self::Error { .. } => "driver",
            Self::Controller(_) => "controller",
            Self::Node { .. } => "node",
        }
    }

    /// Event name as emitted by the driver, before any schema renames.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllNodesReady => "all nodes ready",
            Self::Error { .. } => "error",
            Self::Controller(event) => match event {
                ControllerEvent::InclusionStarted { .. } => "inclusion started",
                ControllerEvent::InclusionStopped => "inclusion stopped",
                ControllerEvent::InclusionFailed => "inclusion failed",
                ControllerEvent::ExclusionStarted => "exclusion started",
                ControllerEvent::ExclusionStopped => "exclusion stopped",
                ControllerEvent::ExclusionFailed => "exclusion failed",
                ControllerEvent::NodeAdded { .. } => "node added",
                ControllerEvent::NodeRemoved { .. } => "node removed",
                ControllerEvent::HealNetworkProgress { .. } => "heal network progress",
                ControllerEvent::HealNetworkDone { .. } => "heal network done",
                ControllerEvent::StatisticsUpdated(_) => "statistics updated",
            },
            Self::Node { event, .. } => match event {
                NodeEvent::ValueAdded(_) => "value added",
                NodeEvent::ValueUpdated(_) => "value updated",
                NodeEvent::ValueRemoved(_) => "value removed",
                NodeEvent::ValueNotification(_) => "value notification",
                NodeEvent::MetadataUpdated { .. } => "metadata updated",
                NodeEvent::Ready { .. } => "ready",
                NodeEvent::InterviewStarted => "interview started",
                NodeEvent::InterviewStageCompleted { .. } => "interview stage completed",
                NodeEvent::InterviewCompleted => "interview completed",
                NodeEvent::InterviewFailed(_) => "interview failed",
                NodeEvent::Wakeup => "wake up",
                NodeEvent::Sleep => "sleep",
                NodeEvent::Dead => "dead",
                NodeEvent::Alive => "alive",
                NodeEvent::StatisticsUpdated(_) => "statistics updated",
            },
        }
    }

    /// Node this event concerns, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Node { node_id, .. } => Some(*node_id),
            Self::Controller(
                ControllerEvent::NodeAdded { node, .. } | ControllerEvent::NodeRemoved { node, .. },
            ) => Some(node.node_id),
            _ => None,
        }
    }
}
