//! Canonical driver state.
//!
//! These types are schema independent. The wire shape a client sees is
//! produced from them by the server's snapshotter for the client's
//! negotiated schema version.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::logging::LogConfig;

pub type NodeId = u16;

/// Declares a fieldless enum carried as a number on the wire.
macro_rules! numeric_enum {
    ($(#[$meta:meta])* $name:ident : $repr:ty { $($variant:ident = $value:expr => $label:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn value(self) -> $repr {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl From<$name> for $repr {
            fn from(v: $name) -> Self {
                v.value()
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = String;

            fn try_from(v: $repr) -> Result<Self, Self::Error> {
                match v {
                    $(x if x == $value => Ok(Self::$variant),)+
                    other => Err(format!("invalid {} value {other}", stringify!($name))),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.value().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <$repr>::deserialize(deserializer)?;
                Self::try_from(raw).map_err(serde::de::Error::custom)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

numeric_enum!(
    /// Reachability as the controller last observed it.
    NodeStatus: u8 {
        Unknown = 0 => "Unknown",
        Asleep = 1 => "Asleep",
        Awake = 2 => "Awake",
        Dead = 3 => "Dead",
        Alive = 4 => "Alive",
    }
);

numeric_enum!(
    InterviewStage: u8 {
        None = 0 => "None",
        ProtocolInfo = 1 => "ProtocolInfo",
        NodeInfo = 2 => "NodeInfo",
        CommandClasses = 3 => "CommandClasses",
        OverwriteConfig = 4 => "OverwriteConfig",
        Complete = 5 => "Complete",
    }
);

numeric_enum!(
    SecurityClass: i8 {
        S2Unauthenticated = 0 => "S2_Unauthenticated",
        S2Authenticated = 1 => "S2_Authenticated",
        S2AccessControl = 2 => "S2_AccessControl",
        S0Legacy = 7 => "S0_Legacy",
    }
);

numeric_enum!(
    InclusionStrategy: u8 {
        Default = 0 => "Default",
        SmartStart = 1 => "SmartStart",
        Insecure = 2 => "Insecure",
        SecurityS0 = 3 => "Security_S0",
        SecurityS2 = 4 => "Security_S2",
    }
);

numeric_enum!(
    InclusionState: u8 {
        Idle = 0 => "Idle",
        Including = 1 => "Including",
        Excluding = 2 => "Excluding",
        Busy = 3 => "Busy",
        SmartStart = 4 => "SmartStart",
    }
);

numeric_enum!(
    ControllerStatus: u8 {
        Ready = 0 => "Ready",
        Unresponsive = 1 => "Unresponsive",
        Jammed = 2 => "Jammed",
    }
);

numeric_enum!(
    Protocol: u8 {
        ZWave = 0 => "Z-Wave",
        ZWaveLongRange = 1 => "Z-Wave Long Range",
    }
);

numeric_enum!(
    RemoveNodeReason: u8 {
        Excluded = 0 => "Excluded",
        ProxyExcluded = 1 => "ProxyExcluded",
        RemoveFailed = 2 => "RemoveFailed",
        Replaced = 3 => "Replaced",
        ProxyReplaced = 4 => "ProxyReplaced",
        Reset = 5 => "Reset",
        SmartStartFailed = 6 => "SmartStartFailed",
    }
);

impl Default for InclusionStrategy {
    fn default() -> Self {
        Self::Default
    }
}

impl RemoveNodeReason {
    pub fn is_replacement(self) -> bool {
        matches!(self, Self::Replaced | Self::ProxyReplaced)
    }
}

/// FLiRS wake-up interval of a frequently listening node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequentListening {
    #[serde(rename = "1000ms")]
    Every1000ms,
    #[serde(rename = "250ms")]
    Every250ms,
}

impl FrequentListening {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Every1000ms => "1000ms",
            Self::Every250ms => "250ms",
        }
    }
}

/// A property or property key: numeric or named.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyKey {
    Number(u32),
    Name(String),
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::Name(s.to_owned())
    }
}

impl From<u32> for PropertyKey {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => f.write_str(s),
        }
    }
}

/// Addresses one value on a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueId {
    pub command_class: u8,
    #[serde(default)]
    pub endpoint: u8,
    pub property: PropertyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_key: Option<PropertyKey>,
}

impl ValueId {
    pub fn new(command_class: u8, property: impl Into<PropertyKey>) -> Self {
        Self {
            command_class,
            endpoint: 0,
            property: property.into(),
            property_key: None,
        }
    }

    #[must_use]
    pub fn on_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = endpoint;
        self
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.command_class, self.endpoint, self.property)?;
        if let Some(key) = &self.property_key {
            write!(f, "-{key}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueMetadata {
    #[serde(rename = "type")]
    pub value_type: String,
    pub readable: bool,
    pub writeable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<BTreeMap<String, String>>,
}

impl ValueMetadata {
    pub fn number(label: &str, min: f64, max: f64, unit: Option<&str>) -> Self {
        Self {
            value_type: "number".into(),
            readable: true,
            writeable: true,
            label: Some(label.into()),
            min: Some(min),
            max: Some(max),
            unit: unit.map(str::to_owned),
            states: None,
        }
    }

    pub fn boolean(label: &str, writeable: bool) -> Self {
        Self {
            value_type: "boolean".into(),
            readable: true,
            writeable,
            label: Some(label.into()),
            min: None,
            max: None,
            unit: None,
            states: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueState {
    pub id: ValueId,
    pub command_class_name: String,
    pub property_name: Option<String>,
    pub property_key_name: Option<String>,
    pub cc_version: u8,
    pub metadata: ValueMetadata,
    pub value: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClassRef {
    pub key: u8,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClass {
    pub basic: DeviceClassRef,
    pub generic: DeviceClassRef,
    pub specific: DeviceClassRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandClassInfo {
    pub id: u8,
    pub name: String,
    pub version: u8,
    pub is_secure: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub manufacturer: String,
    pub label: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    pub node_id: NodeId,
    pub index: u8,
    pub installer_icon: Option<u16>,
    pub user_icon: Option<u16>,
    pub device_class: Option<DeviceClass>,
    pub command_classes: Vec<CommandClassInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatistics {
    pub commands_tx: u64,
    pub commands_rx: u64,
    pub commands_dropped_rx: u64,
    pub commands_dropped_tx: u64,
    pub timeout_response: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatistics {
    pub messages_tx: u64,
    pub messages_rx: u64,
    pub messages_dropped_rx: u64,
    pub messages_dropped_tx: u64,
    pub nak: u64,
    pub can: u64,
    pub timeout_ack: u64,
    pub timeout_response: u64,
    pub timeout_callback: u64,
}

/// Everything the driver knows about one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeState {
    pub node_id: NodeId,
    pub installer_icon: Option<u16>,
    pub user_icon: Option<u16>,
    pub status: NodeStatus,
    pub ready: bool,
    pub is_listening: Option<bool>,
    pub is_routing: Option<bool>,
    pub is_secure: Option<bool>,
    pub manufacturer_id: Option<u16>,
    pub product_id: Option<u16>,
    pub product_type: Option<u16>,
    pub firmware_version: Option<String>,
    pub sdk_version: Option<String>,
    pub zwave_plus_version: Option<u8>,
    pub node_type: Option<u8>,
    pub zwave_plus_node_type: Option<u8>,
    pub zwave_plus_role_type: Option<u8>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub device_config: Option<DeviceConfig>,
    pub label: Option<String>,
    pub endpoint_count_is_dynamic: Option<bool>,
    pub endpoints_have_identical_capabilities: Option<bool>,
    pub individual_endpoint_count: Option<u8>,
    pub aggregated_endpoint_count: Option<u8>,
    pub interview_attempts: u32,
    pub interview_stage: InterviewStage,
    pub frequent_listening: Option<FrequentListening>,
    pub max_data_rate: Option<u32>,
    pub supported_data_rates: Vec<u32>,
    pub protocol_version: Option<u8>,
    pub supports_beaming: Option<bool>,
    pub supports_security: Option<bool>,
    pub device_class: Option<DeviceClass>,
    pub command_classes: Vec<CommandClassInfo>,
    pub endpoints: Vec<EndpointState>,
    pub values: Vec<ValueState>,
    pub highest_security_class: Option<SecurityClass>,
    pub is_controller_node: bool,
    pub keep_awake: bool,
    pub statistics: NodeStatistics,
    pub default_volume: Option<u8>,
    pub default_transition_duration: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub protocol: Protocol,
}

impl NodeState {
    /// A node that has been added but not yet interviewed.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            installer_icon: None,
            user_icon: None,
            status: NodeStatus::Unknown,
            ready: false,
            is_listening: None,
            is_routing: None,
            is_secure: None,
            manufacturer_id: None,
            product_id: None,
            product_type: None,
            firmware_version: None,
            sdk_version: None,
            zwave_plus_version: None,
            node_type: None,
            zwave_plus_node_type: None,
            zwave_plus_role_type: None,
            name: None,
            location: None,
            device_config: None,
            label: None,
            endpoint_count_is_dynamic: None,
            endpoints_have_identical_capabilities: None,
            individual_endpoint_count: None,
            aggregated_endpoint_count: None,
            interview_attempts: 0,
            interview_stage: InterviewStage::None,
            frequent_listening: None,
            max_data_rate: None,
            supported_data_rates: Vec::new(),
            protocol_version: None,
            supports_beaming: None,
            supports_security: None,
            device_class: None,
            command_classes: Vec::new(),
            endpoints: Vec::new(),
            values: Vec::new(),
            highest_security_class: None,
            is_controller_node: false,
            keep_awake: false,
            statistics: NodeStatistics::default(),
            default_volume: None,
            default_transition_duration: None,
            last_seen: None,
            protocol: Protocol::ZWave,
        }
    }

    pub fn value(&self, id: &ValueId) -> Option<&ValueState> {
        self.values.iter().find(|v| &v.id == id)
    }

    pub fn value_mut(&mut self, id: &ValueId) -> Option<&mut ValueState> {
        self.values.iter_mut().find(|v| &v.id == id)
    }

    /// Endpoint 0 is the node itself and is always present.
    pub fn endpoint(&self, index: u8) -> Option<EndpointState> {
        if index == 0 {
            return Some(EndpointState {
                node_id: self.node_id,
                index: 0,
                installer_icon: self.installer_icon,
                user_icon: self.user_icon,
                device_class: self.device_class.clone(),
                command_classes: self.command_classes.clone(),
            });
        }
        self.endpoints.iter().find(|e| e.index == index).cloned()
    }
}

/// Summary of the controller the driver talks to.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    pub library_version: Option<String>,
    pub controller_type: Option<u8>,
    pub home_id: Option<u32>,
    pub own_node_id: Option<NodeId>,
    pub is_secondary: Option<bool>,
    pub is_using_home_id_from_other_network: Option<bool>,
    pub is_sis_present: Option<bool>,
    pub was_real_primary: Option<bool>,
    pub is_static_update_controller: Option<bool>,
    pub is_slave: Option<bool>,
    pub serial_api_version: Option<String>,
    pub manufacturer_id: Option<u16>,
    pub product_type: Option<u16>,
    pub product_id: Option<u16>,
    pub supported_function_types: Vec<u8>,
    pub suc_node_id: Option<NodeId>,
    pub supports_timers: Option<bool>,
    pub is_heal_network_active: bool,
    pub statistics: ControllerStatistics,
    pub inclusion_state: InclusionState,
    pub rf_region: Option<u8>,
    pub status: ControllerStatus,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            library_version: None,
            controller_type: None,
            home_id: None,
            own_node_id: None,
            is_secondary: None,
            is_using_home_id_from_other_network: None,
            is_sis_present: None,
            was_real_primary: None,
            is_static_update_controller: None,
            is_slave: None,
            serial_api_version: None,
            manufacturer_id: None,
            product_type: None,
            product_id: None,
            supported_function_types: Vec::new(),
            suc_node_id: None,
            supports_timers: None,
            is_heal_network_active: false,
            statistics: ControllerStatistics::default(),
            inclusion_state: InclusionState::Idle,
            rf_region: None,
            status: ControllerStatus::Ready,
        }
    }
}

/// Point-in-time copy of the driver state the snapshotter renders.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverSnapshot {
    pub log_config: LogConfig,
    pub statistics_enabled: bool,
    pub controller: ControllerState,
    /// Sorted by node id.
    pub nodes: Vec<NodeState>,
    /// Position of the last event whose effect this snapshot includes.
    pub event_seq: u64,
}

/// Security classes granted (or requested) during S2 bootstrapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionGrant {
    pub security_classes: Vec<SecurityClass>,
    pub client_side_auth: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionOptions {
    #[serde(default)]
    pub strategy: InclusionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_security: Option<bool>,
}
