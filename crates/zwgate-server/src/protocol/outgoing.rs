use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::errors::CommandError;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Version(VersionMessage),
    Event { event: Value },
    Result(ResultMessage),
}

impl OutgoingMessage {
    pub fn to_text(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}

/// Sent unsolicited as the first frame of every connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMessage {
    pub driver_version: String,
    pub server_version: String,
    pub home_id: Option<u32>,
    pub min_schema_version: u32,
    pub max_schema_version: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub message_id: String,
    pub success: bool,
    #[serde(flatten)]
    pub body: ResultBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResultBody {
    Success { result: Value },
    Failure(Map<String, Value>),
}

impl ResultMessage {
    pub fn success(message_id: impl Into<String>, result: Value) -> Self {
        Self {
            message_id: message_id.into(),
            success: true,
            body: ResultBody::Success { result },
        }
    }

    /// Error reply shaped for a client on `schema`.
    pub fn failure(message_id: impl Into<String>, error: &CommandError, schema: u32) -> Self {
        Self {
            message_id: message_id.into(),
            success: false,
            body: ResultBody::Failure(error.to_wire(schema)),
        }
    }
}

impl From<ResultMessage> for OutgoingMessage {
    fn from(msg: ResultMessage) -> Self {
        Self::Result(msg)
    }
}
