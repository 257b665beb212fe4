//! Parsing of client frames into [`Command`]s.
//!
//! The dotted `"<namespace>.<action>"` string only exists at this boundary.
//! Each namespace is a closed enum; the `command` field is rewritten to the
//! bare action and serde's internal tagging does the rest.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use zwgate_core::logging::LogConfigUpdate;
use zwgate_core::model::{InclusionGrant, InclusionOptions, NodeId, ValueId};

use super::errors::CommandError;

/// A frame that cannot be answered because no `messageId` is recoverable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string messageId")]
    MissingMessageId,
}

/// A well-formed request. The command itself may still be missing, unknown
/// or carry bad parameters; that is answered with an error reply.
#[derive(Debug)]
pub struct IncomingMessage {
    pub message_id: String,
    /// The command string as the client sent it.
    pub command_name: String,
    pub command: Result<Command, CommandError>,
}

pub fn parse_frame(text: &str) -> Result<IncomingMessage, FrameError> {
    let mut frame: Value = serde_json::from_str(text)?;
    let obj = frame.as_object_mut().ok_or(FrameError::NotAnObject)?;
    let message_id = match obj.get("messageId") {
        Some(Value::String(id)) => id.clone(),
        _ => return Err(FrameError::MissingMessageId),
    };
    let (command_name, command) = match obj.get("command").cloned() {
        Some(Value::String(name)) => {
            let command = Command::parse(&name, frame);
            (name, command)
        }
        // Absent or not a string: still answerable by messageId.
        other => {
            let shown = other.map_or_else(String::new, |v| v.to_string());
            (shown.clone(), Err(CommandError::UnknownCommand(shown)))
        }
    };
    Ok(IncomingMessage {
        message_id,
        command_name,
        command,
    })
}

/// Server commands that may also be sent as `driver.<action>`.
const DRIVER_LOG_ALIASES: &[&str] = &[
    "update_log_config",
    "get_log_config",
    "start_listening_logs",
    "stop_listening_logs",
];

/// A command enum whose wire tags are known up front.
trait CommandSet: DeserializeOwned {
    const ACTIONS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Server(ServerCommand),
    Driver(DriverCommand),
    Controller(ControllerCommand),
    Node(NodeCommand),
}

impl Command {
    pub fn parse(command: &str, frame: Value) -> Result<Self, CommandError> {
        match command.split_once('.') {
            None => decode(command, command, frame).map(Self::Server),
            Some(("driver", action)) if DRIVER_LOG_ALIASES.contains(&action) => {
                decode(command, action, frame).map(Self::Server)
            }
            Some(("driver", action)) => decode(command, action, frame).map(Self::Driver),
            Some(("controller", action)) => decode(command, action, frame).map(Self::Controller),
            Some(("node", action)) => decode(command, action, frame).map(Self::Node),
            Some(_) => Err(CommandError::UnknownCommand(command.to_string())),
        }
    }

    /// Namespace label used for metrics and logs.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Server(_) => "server",
            Self::Driver(_) => "driver",
            Self::Controller(_) => "controller",
            Self::Node(_) => "node",
        }
    }
}

fn decode<T: CommandSet>(command: &str, action: &str, mut frame: Value) -> Result<T, CommandError> {
    if !T::ACTIONS.contains(&action) {
        return Err(CommandError::UnknownCommand(command.to_string()));
    }
    if let Some(obj) = frame.as_object_mut() {
        let _ = obj.insert("command".into(), Value::String(action.to_string()));
    }
    serde_json::from_value(frame).map_err(|e| CommandError::InvalidParams {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// Session-level commands. Also accepted under the `driver.` prefix for the
/// log commands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ServerCommand {
    #[serde(rename_all = "camelCase")]
    Initialize {
        schema_version: i64,
        #[serde(default)]
        additional_user_agent_components: Option<BTreeMap<String, String>>,
    },
    #[serde(rename_all = "camelCase")]
    SetApiSchema { schema_version: i64 },
    StartListening,
    UpdateLogConfig { config: LogConfigUpdate },
    GetLogConfig,
    StartListeningLogs {
        #[serde(default)]
        filter: Option<LogFilter>,
    },
    StopListeningLogs,
}

impl CommandSet for ServerCommand {
    const ACTIONS: &'static [&'static str] = &[
        "initialize",
        "set_api_schema",
        "start_listening",
        "update_log_config",
        "get_log_config",
        "start_listening_logs",
        "stop_listening_logs",
    ];
}

/// Per-session restriction on forwarded log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

impl LogFilter {
    pub fn matches(&self, node_id: Option<NodeId>) -> bool {
        match self.node_id {
            Some(wanted) => node_id == Some(wanted),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DriverCommand {
    GetConfig,
    #[serde(rename_all = "camelCase")]
    EnableStatistics {
        application_name: String,
        application_version: String,
    },
    DisableStatistics,
    IsStatisticsEnabled,
}

impl CommandSet for DriverCommand {
    const ACTIONS: &'static [&'static str] = &[
        "get_config",
        "enable_statistics",
        "disable_statistics",
        "is_statistics_enabled",
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControllerCommand {
    BeginInclusion {
        #[serde(default)]
        options: Option<InclusionOptions>,
    },
    StopInclusion,
    BeginExclusion,
    StopExclusion,
    #[serde(rename_all = "camelCase")]
    GrantSecurityClasses { inclusion_grant: InclusionGrant },
    ValidateDskAndEnterPin { pin: String },
    #[serde(alias = "begin_rebuilding_routes")]
    BeginHealingNetwork,
    #[serde(alias = "stop_rebuilding_routes")]
    StopHealingNetwork,
    #[serde(rename_all = "camelCase")]
    RemoveFailedNode { node_id: NodeId },
    GetState,
}

impl CommandSet for ControllerCommand {
    const ACTIONS: &'static [&'static str] = &[
        "begin_inclusion",
        "stop_inclusion",
        "begin_exclusion",
        "stop_exclusion",
        "grant_security_classes",
        "validate_dsk_and_enter_pin",
        "begin_healing_network",
        "begin_rebuilding_routes",
        "stop_healing_network",
        "stop_rebuilding_routes",
        "remove_failed_node",
        "get_state",
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum NodeCommand {
    #[serde(rename_all = "camelCase")]
    GetState { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    SetValue {
        node_id: NodeId,
        value_id: ValueId,
        value: Value,
        #[serde(default)]
        options: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    GetValue { node_id: NodeId, value_id: ValueId },
    #[serde(rename_all = "camelCase")]
    GetDefinedValueIds { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    GetValueMetadata { node_id: NodeId, value_id: ValueId },
    #[serde(rename_all = "camelCase")]
    RefreshInfo { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    Ping { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    SetName { node_id: NodeId, name: String },
    #[serde(rename_all = "camelCase")]
    SetLocation { node_id: NodeId, location: String },
    #[serde(rename_all = "camelCase")]
    GetEndpoint { node_id: NodeId, endpoint: u8 },
}

impl CommandSet for NodeCommand {
    const ACTIONS: &'static [&'static str] = &[
        "get_state",
        "set_value",
        "get_value",
        "get_defined_value_ids",
        "get_value_metadata",
        "refresh_info",
        "ping",
        "set_name",
        "set_location",
        "get_endpoint",
    ];
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use serde_json::json;
    use zwgate_core::model::{InclusionStrategy, SecurityClass};

    fn parse(frame: Value) -> IncomingMessage {
        parse_frame(&frame.to_string()).unwrap()
    }

    #[test]
    fn handshake_commands() {
        let msg = parse(json!({"messageId": "1", "command": "set_api_schema", "schemaVersion": 5}));
        assert_eq!(msg.message_id, "1");
        assert_eq!(
            msg.command.unwrap(),
            Command::Server(ServerCommand::SetApiSchema { schema_version: 5 })
        );

        let msg = parse(json!({"messageId": "2", "command": "start_listening"}));
        assert_eq!(
            msg.command.unwrap(),
            Command::Server(ServerCommand::StartListening)
        );
    }

    #[test]
    fn driver_prefixed_log_commands_are_server_commands() {
        let msg = parse(json!({
            "messageId": "a",
            "command": "driver.start_listening_logs",
            "filter": {"nodeId": 4},
        }));
        assert_eq!(
            msg.command.unwrap(),
            Command::Server(ServerCommand::StartListeningLogs {
                filter: Some(LogFilter { node_id: Some(4) })
            })
        );
        let msg = parse(json!({"messageId": "c", "command": "driver.initialize", "schemaVersion": 1}));
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(_))));

        let msg = parse(json!({"messageId": "b", "command": "start_listening_logs"}));
        assert_eq!(
            msg.command.unwrap(),
            Command::Server(ServerCommand::StartListeningLogs { filter: None })
        );
    }

    #[test]
    fn controller_inclusion_options() {
        let msg = parse(json!({
            "messageId": "3",
            "command": "controller.begin_inclusion",
            "options": {"strategy": 4},
        }));
        match msg.command.unwrap() {
            Command::Controller(ControllerCommand::BeginInclusion { options: Some(o) }) => {
                assert_eq!(o.strategy, InclusionStrategy::SecurityS2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn grant_security_classes_params() {
        let msg = parse(json!({
            "messageId": "4",
            "command": "controller.grant_security_classes",
            "inclusionGrant": {"securityClasses": [1], "clientSideAuth": false},
        }));
        match msg.command.unwrap() {
            Command::Controller(ControllerCommand::GrantSecurityClasses { inclusion_grant }) => {
                assert_eq!(
                    inclusion_grant.security_classes,
                    vec![SecurityClass::S2Authenticated]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rebuild_routes_alias() {
        let msg = parse(json!({"messageId": "5", "command": "controller.begin_rebuilding_routes"}));
        assert_eq!(
            msg.command.unwrap(),
            Command::Controller(ControllerCommand::BeginHealingNetwork)
        );
    }

    #[test]
    fn node_set_value() {
        let msg = parse(json!({
            "messageId": "6",
            "command": "node.set_value",
            "nodeId": 2,
            "valueId": {"commandClass": 37, "property": "targetValue"},
            "value": true,
        }));
        match msg.command.unwrap() {
            Command::Node(NodeCommand::SetValue {
                node_id,
                value_id,
                value,
                options,
            }) => {
                assert_eq!(node_id, 2);
                assert_eq!(value_id, ValueId::new(37, "targetValue"));
                assert_eq!(value, json!(true));
                assert!(options.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_namespace_and_action() {
        let msg = parse(json!({"messageId": "3", "command": "bogus.thing"}));
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(ref c)) if c == "bogus.thing"));

        let msg = parse(json!({"messageId": "4", "command": "node.explode", "nodeId": 2}));
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(_))));

        let msg = parse(json!({"messageId": "5", "command": "frobnicate"}));
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(_))));
    }

    #[test]
    fn bad_params_are_invalid_params() {
        let msg = parse(json!({"messageId": "7", "command": "node.get_state"}));
        match msg.command {
            Err(CommandError::InvalidParams { command, message }) => {
                assert_eq!(command, "node.get_state");
                assert!(message.contains("nodeId"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_frames() {
        assert!(matches!(parse_frame("{not json"), Err(FrameError::NotJson(_))));
        assert!(matches!(parse_frame("[1,2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(
            parse_frame(r#"{"command": "start_listening"}"#),
            Err(FrameError::MissingMessageId)
        ));
        assert!(matches!(
            parse_frame(r#"{"messageId": 4, "command": "start_listening"}"#),
            Err(FrameError::MissingMessageId)
        ));
    }

    #[test]
    fn missing_or_non_string_command_is_unknown() {
        let msg = parse(json!({"messageId": "9"}));
        assert_eq!(msg.message_id, "9");
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(ref c)) if c.is_empty()));

        let msg = parse(json!({"messageId": "10", "command": 42}));
        assert_eq!(msg.command_name, "42");
        assert!(matches!(msg.command, Err(CommandError::UnknownCommand(ref c)) if c == "42"));
    }

    /// Every tag serde accepts for `T`, aliases included, read back from
    /// the unknown-variant error.
    fn serde_tags<T: CommandSet + std::fmt::Debug>() -> BTreeSet<String> {
        let err = serde_json::from_value::<T>(json!({"command": "__unlisted__"}))
            .unwrap_err()
            .to_string();
        let (_, expected) = err.split_once("expected").expect(&err);
        expected.split('`').skip(1).step_by(2).map(str::to_owned).collect()
    }

    fn action_set<T: CommandSet>() -> BTreeSet<String> {
        T::ACTIONS.iter().map(|a| (*a).to_owned()).collect()
    }

    #[test]
    fn action_lists_match_serde_tags() {
        assert_eq!(action_set::<ServerCommand>(), serde_tags::<ServerCommand>());
        assert_eq!(action_set::<DriverCommand>(), serde_tags::<DriverCommand>());
        assert_eq!(action_set::<ControllerCommand>(), serde_tags::<ControllerCommand>());
        assert_eq!(action_set::<NodeCommand>(), serde_tags::<NodeCommand>());
    }

    #[test]
    fn every_action_reaches_its_namespace() {
        let cases = [
            ("", "server", ServerCommand::ACTIONS),
            ("driver.", "driver", DriverCommand::ACTIONS),
            ("driver.", "server", DRIVER_LOG_ALIASES),
            ("controller.", "controller", ControllerCommand::ACTIONS),
            ("node.", "node", NodeCommand::ACTIONS),
        ];
        for (prefix, namespace, actions) in cases {
            for action in actions {
                let name = format!("{prefix}{action}");
                match Command::parse(&name, json!({})) {
                    Ok(command) => assert_eq!(command.namespace(), namespace, "{name}"),
                    Err(CommandError::InvalidParams { command, .. }) => assert_eq!(command, name),
                    Err(other) => panic!("{name} was rejected: {other:?}"),
                }
            }
        }
        for alias in DRIVER_LOG_ALIASES {
            assert!(ServerCommand::ACTIONS.contains(alias), "{alias}");
            assert!(!DriverCommand::ACTIONS.contains(alias), "{alias}");
        }
    }

    #[test]
    fn log_filter_matching() {
        let any = LogFilter::default();
        assert!(any.matches(None));
        assert!(any.matches(Some(3)));
        let node = LogFilter { node_id: Some(3) };
        assert!(node.matches(Some(3)));
        assert!(!node.matches(Some(4)));
        assert!(!node.matches(None));
    }
}
