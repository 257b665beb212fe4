//! Command failures and their wire encoding.

use serde::Serialize;
use serde_json::{json, Map, Value};
use zwgate_core::model::NodeId;
use zwgate_core::DriverError;

use super::STRUCTURED_ERRORS_SINCE;
use crate::decision::DecisionKind;

/// Stable error codes sent in `errorCode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownError,
    UnknownCommand,
    NodeNotFound,
    EndpointNotFound,
    SchemaIncompatible,
    InclusionPhaseNotInProgress,
    ZwaveError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown_error",
            Self::UnknownCommand => "unknown_command",
            Self::NodeNotFound => "node_not_found",
            Self::EndpointNotFound => "endpoint_not_found",
            Self::SchemaIncompatible => "schema_incompatible",
            Self::InclusionPhaseNotInProgress => "inclusion_phase_not_in_progress",
            Self::ZwaveError => "zwave_error",
        }
    }
}

/// Sent as `zwaveErrorCode` when a non-driver failure is folded into the
/// driver error shape for old clients.
const LEGACY_SENTINEL_CODE: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Schema version {requested} is not supported (supported: {min}..={max})")]
    SchemaIncompatible { requested: i64, min: u32, max: u32 },

    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Endpoint {endpoint} not found on node {node_id}")]
    EndpointNotFound { node_id: NodeId, endpoint: u8 },

    #[error("No inclusion is waiting for {0}")]
    InclusionPhaseNotInProgress(DecisionKind),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Invalid parameters for {command}: {message}")]
    InvalidParams { command: String, message: String },

    #[error("{0}")]
    Internal(String),
}

impl CommandError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownCommand(_) => ErrorCode::UnknownCommand,
            Self::SchemaIncompatible { .. } => ErrorCode::SchemaIncompatible,
            Self::NodeNotFound(_) => ErrorCode::NodeNotFound,
            Self::EndpointNotFound { .. } => ErrorCode::EndpointNotFound,
            Self::InclusionPhaseNotInProgress(_) => ErrorCode::InclusionPhaseNotInProgress,
            Self::Driver(_) => ErrorCode::ZwaveError,
            Self::InvalidParams { .. } | Self::Internal(_) => ErrorCode::UnknownError,
        }
    }

    fn args(&self) -> Option<Value> {
        match self {
            Self::UnknownCommand(command) => Some(json!({ "command": command })),
            Self::SchemaIncompatible {
                requested,
                min,
                max,
            } => Some(json!({ "requested": requested, "min": min, "max": max })),
            Self::NodeNotFound(node_id) => Some(json!({ "nodeId": node_id })),
            Self::EndpointNotFound { node_id, endpoint } => {
                Some(json!({ "nodeId": node_id, "index": endpoint }))
            }
            Self::InclusionPhaseNotInProgress(kind) => Some(json!({ "phase": kind.as_str() })),
            Self::Driver(_) | Self::InvalidParams { .. } | Self::Internal(_) => None,
        }
    }

    /// Fields merged into a failed `result` message for a client on `schema`.
    pub fn to_wire(&self, schema: u32) -> Map<String, Value> {
        let mut body = Map::new();
        let structured = schema >= STRUCTURED_ERRORS_SINCE;
        let _ = body.insert("errorCode".into(), json!(ErrorCode::ZwaveError.as_str()));

        match self {
            Self::Driver(err) => {
                let _ = body.insert("zwaveErrorCode".into(), json!(err.code.code()));
                let _ = body.insert("zwaveErrorMessage".into(), json!(err.message));
                if structured {
                    if let Some(name) = err.code.name() {
                        let _ = body.insert("zwaveErrorCodeName".into(), json!(name));
                    }
                }
            }
            other if structured => {
                let _ = body.insert("errorCode".into(), json!(other.code().as_str()));
                let _ = body.insert("message".into(), json!(other.to_string()));
                if let Some(args) = other.args() {
                    let _ = body.insert("args".into(), args);
                }
            }
            other => {
                let _ = body.insert("zwaveErrorCode".into(), json!(LEGACY_SENTINEL_CODE));
                let _ = body.insert(
                    "zwaveErrorMessage".into(),
                    json!(format!("{}: {other}", other.code().as_str())),
                );
            }
        }
        body
    }
}
