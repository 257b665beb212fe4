//! Driver events rendered for one schema version.
//!
//! [`render_event`] is called once per distinct schema version among the
//! listening sessions. It returns `None` for events that did not exist at
//! that version.

use serde_json::{json, Map, Value};
use zwgate_core::events::{ControllerEvent, InterviewFailure, NodeEvent, ValueChange};
use zwgate_core::logging::LogEntry;
use zwgate_core::model::{InclusionGrant, NodeId, ValueId};
use zwgate_core::DriverEvent;

use crate::state::dump_node;

/// Statistics events were introduced with schema 7.
const STATISTICS_SINCE: u32 = 7;
/// `interview failed` carries its failure details from schema 10.
const INTERVIEW_FAILURE_ARGS_SINCE: u32 = 10;
/// `node removed` reports a `reason` instead of `replaced` from schema 29.
const REMOVE_REASON_SINCE: u32 = 29;
/// Healing is called "rebuilding routes" from schema 31.
const REBUILD_ROUTES_SINCE: u32 = 31;

fn event(source: &str, name: &str, fields: Value) -> Value {
    let mut body = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let _ = body.insert("source".into(), json!(source));
    let _ = body.insert("event".into(), json!(name));
    Value::Object(body)
}

/// The `event` payload for `ev` as a client on `schema` sees it.
pub fn render_event(ev: &DriverEvent, schema: u32) -> Option<Value> {
    let source = ev.source();
    match ev {
        DriverEvent::AllNodesReady => Some(event(source, ev.name(), json!({}))),
        DriverEvent::Error { message } => {
            Some(event(source, ev.name(), json!({ "error": message })))
        }
        DriverEvent::Controller(c) => render_controller(c, ev.name(), schema),
        DriverEvent::Node { node_id, event: n } => render_node(*node_id, n, ev.name(), schema),
    }
}

fn render_controller(ev: &ControllerEvent, name: &str, schema: u32) -> Option<Value> {
    let rebuild = schema >= REBUILD_ROUTES_SINCE;
    let fields = match ev {
        ControllerEvent::InclusionStarted { secure } => json!({ "secure": secure }),
        ControllerEvent::InclusionStopped
        | ControllerEvent::InclusionFailed
        | ControllerEvent::ExclusionStarted
        | ControllerEvent::ExclusionStopped
        | ControllerEvent::ExclusionFailed => json!({}),
        ControllerEvent::NodeAdded { node, low_security } => json!({
            "node": dump_node(node, schema),
            "result": { "lowSecurity": low_security },
        }),
        ControllerEvent::NodeRemoved { node, reason } => {
            if schema >= REMOVE_REASON_SINCE {
                json!({ "node": dump_node(node, schema), "reason": reason })
            } else {
                json!({ "node": dump_node(node, schema), "replaced": reason.is_replacement() })
            }
        }
        ControllerEvent::HealNetworkProgress { progress } => {
            let name = if rebuild { "rebuild routes progress" } else { name };
            return Some(event("controller", name, json!({ "progress": progress })));
        }
        ControllerEvent::HealNetworkDone { result } => {
            let name = if rebuild { "rebuild routes done" } else { name };
            return Some(event("controller", name, json!({ "result": result })));
        }
        ControllerEvent::StatisticsUpdated(stats) => {
            if schema < STATISTICS_SINCE {
                return None;
            }
            json!({ "statistics": stats })
        }
    };
    Some(event("controller", name, fields))
}

fn render_node(node_id: NodeId, ev: &NodeEvent, name: &str, schema: u32) -> Option<Value> {
    let fields = match ev {
        NodeEvent::ValueAdded(change) => {
            value_event(node_id, change, &[("newValue", &change.new_value)])
        }
        NodeEvent::ValueUpdated(change) => value_event(
            node_id,
            change,
            &[("prevValue", &change.prev_value), ("newValue", &change.new_value)],
        ),
        NodeEvent::ValueRemoved(change) => {
            value_event(node_id, change, &[("prevValue", &change.prev_value)])
        }
        NodeEvent::ValueNotification(change) => {
            value_event(node_id, change, &[("value", &change.new_value)])
        }
        NodeEvent::MetadataUpdated { id, metadata } => {
            let mut args = value_id_fields(id);
            let _ = args.insert("metadata".into(), json!(metadata));
            json!({ "nodeId": node_id, "args": args })
        }
        NodeEvent::Ready { node } => json!({
            "nodeId": node_id,
            "nodeState": dump_node(node, schema),
        }),
        NodeEvent::InterviewStageCompleted { stage } => json!({
            "nodeId": node_id,
            "stageName": stage.label(),
        }),
        NodeEvent::InterviewFailed(failure) => interview_failed(node_id, failure, schema),
        NodeEvent::StatisticsUpdated(stats) => {
            if schema < STATISTICS_SINCE {
                return None;
            }
            json!({ "nodeId": node_id, "statistics": stats })
        }
        NodeEvent::InterviewStarted
        | NodeEvent::InterviewCompleted
        | NodeEvent::Wakeup
        | NodeEvent::Sleep
        | NodeEvent::Dead
        | NodeEvent::Alive => json!({ "nodeId": node_id }),
    };
    Some(event("node", name, fields))
}

fn interview_failed(node_id: NodeId, failure: &InterviewFailure, schema: u32) -> Value {
    if schema < INTERVIEW_FAILURE_ARGS_SINCE {
        return json!({ "nodeId": node_id });
    }
    json!({
        "nodeId": node_id,
        "args": {
            "errorMessage": failure.error_message,
            "isFinal": failure.is_final,
            "attempt": failure.attempt,
            "maxAttempts": failure.max_attempts,
        },
    })
}

fn value_id_fields(id: &ValueId) -> Map<String, Value> {
    let mut args = Map::new();
    let _ = args.insert("commandClass".into(), json!(id.command_class));
    let _ = args.insert("endpoint".into(), json!(id.endpoint));
    let _ = args.insert("property".into(), json!(id.property));
    if let Some(key) = &id.property_key {
        let _ = args.insert("propertyKey".into(), json!(key));
    }
    args
}

fn value_event(
    node_id: NodeId,
    change: &ValueChange,
    values: &[(&str, &Option<Value>)],
) -> Value {
    let mut args = value_id_fields(&change.id);
    let _ = args.insert(
        "commandClassName".into(),
        json!(change.command_class_name),
    );
    set_opt(&mut args, "propertyName", change.property_name.as_ref());
    set_opt(&mut args, "propertyKeyName", change.property_key_name.as_ref());
    for (key, value) in values {
        set_opt(&mut args, key, value.as_ref());
    }
    json!({ "nodeId": node_id, "args": args })
}

fn set_opt<T: serde::Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<&T>) {
    if let Some(value) = value {
        let _ = map.insert(key.into(), json!(value));
    }
}

// ── decision events ─────────────────────────────────────────────────

pub fn grant_security_classes(requested: &InclusionGrant) -> Value {
    event(
        "controller",
        "grant security classes",
        json!({ "requested": requested }),
    )
}

pub fn validate_dsk_and_enter_pin(dsk: &str) -> Value {
    event(
        "controller",
        "validate dsk and enter pin",
        json!({ "dsk": dsk }),
    )
}

pub fn inclusion_aborted() -> Value {
    event("controller", "inclusion aborted", json!({}))
}

// ── log events ──────────────────────────────────────────────────────

/// A forwarded driver log line. Log events have one shape at every schema.
pub fn render_log(entry: &LogEntry) -> Value {
    let message = if entry.is_multiline() {
        json!(entry.message)
    } else {
        json!(entry.message.first().map_or("", String::as_str))
    };
    let mut fields = Map::new();
    let _ = fields.insert("formattedMessage".into(), json!(entry.formatted()));
    let _ = fields.insert("message".into(), message);
    let _ = fields.insert("level".into(), json!(entry.level));
    let _ = fields.insert("direction".into(), json!(entry.direction));
    let _ = fields.insert("label".into(), json!(entry.label));
    set_opt(&mut fields, "primaryTags", entry.primary_tags.as_ref());
    set_opt(&mut fields, "secondaryTags", entry.secondary_tags.as_ref());
    let _ = fields.insert("multiline".into(), json!(entry.is_multiline()));
    let _ = fields.insert("timestamp".into(), json!(entry.timestamp.to_rfc3339()));
    let _ = fields.insert("context".into(), json!(entry.context));
    event("driver", "logging", Value::Object(fields))
}
