//! Schema-versioned state documents.
//!
//! Every document starts from its version-0 shape. An ordered ladder of
//! `(since, transform)` pairs is then applied, each transform running when
//! `since <= schema`. Rendering is a pure function of the canonical state
//! and the schema version.

use serde_json::{json, Map, Value};
use zwgate_core::model::{
    ControllerState, DriverSnapshot, EndpointState, NodeState, ValueMetadata, ValueState,
};

type Doc = Map<String, Value>;
type Transform<T> = fn(&T, &mut Doc);

fn project<T>(source: &T, schema: u32, base: fn(&T) -> Doc, ladder: &[(u32, Transform<T>)]) -> Doc {
    let mut doc = base(source);
    for (since, transform) in ladder {
        if *since <= schema {
            transform(source, &mut doc);
        }
    }
    doc
}

fn set(doc: &mut Doc, key: &str, value: Value) {
    let _ = doc.insert(key.to_owned(), value);
}

fn rename(doc: &mut Doc, from: &str, to: &str) {
    if let Some(value) = doc.remove(from) {
        let _ = doc.insert(to.to_owned(), value);
    }
}

/// Object literal whose values go through `json!`.
macro_rules! doc {
    ($($key:literal : $value:expr),* $(,)?) => {{
        let mut doc = Doc::new();
        $( set(&mut doc, $key, json!($value)); )*
        doc
    }};
}

// ── full state ──────────────────────────────────────────────────────

const STATE_LADDER: &[(u32, Transform<DriverSnapshot>)] = &[(1, state_v1)];

/// The `state` object returned by `start_listening`.
pub fn dump_state(snapshot: &DriverSnapshot, schema: u32) -> Value {
    let mut doc = project(snapshot, schema, |_| Doc::new(), STATE_LADDER);
    set(&mut doc, "controller", dump_controller(&snapshot.controller, schema));
    set(
        &mut doc,
        "nodes",
        Value::Array(snapshot.nodes.iter().map(|n| dump_node(n, schema)).collect()),
    );
    Value::Object(doc)
}

fn state_v1(snapshot: &DriverSnapshot, doc: &mut Doc) {
    set(doc, "driver", dump_driver(snapshot));
}

/// `{logConfig, statisticsEnabled}`
pub fn dump_driver(snapshot: &DriverSnapshot) -> Value {
    json!({
        "logConfig": snapshot.log_config,
        "statisticsEnabled": snapshot.statistics_enabled,
    })
}

// ── controller ──────────────────────────────────────────────────────

const CONTROLLER_LADDER: &[(u32, Transform<ControllerState>)] = &[
    (7, controller_v7),
    (16, controller_v16),
    (22, controller_v22),
    (31, controller_v31),
    (33, controller_v33),
];

pub fn dump_controller(controller: &ControllerState, schema: u32) -> Value {
    Value::Object(project(controller, schema, controller_base, CONTROLLER_LADDER))
}

fn controller_base(c: &ControllerState) -> Doc {
    doc! {
        "libraryVersion": c.library_version,
        "type": c.controller_type,
        "homeId": c.home_id,
        "ownNodeId": c.own_node_id,
        "isSecondary": c.is_secondary,
        "isUsingHomeIdFromOtherNetwork": c.is_using_home_id_from_other_network,
        "isSISPresent": c.is_sis_present,
        "wasRealPrimary": c.was_real_primary,
        "isStaticUpdateController": c.is_static_update_controller,
        "isSlave": c.is_slave,
        "serialApiVersion": c.serial_api_version,
        "manufacturerId": c.manufacturer_id,
        "productType": c.product_type,
        "productId": c.product_id,
        "supportedFunctionTypes": c.supported_function_types,
        "sucNodeId": c.suc_node_id,
        "supportsTimers": c.supports_timers,
        "isHealNetworkActive": c.is_heal_network_active,
    }
}

fn controller_v7(c: &ControllerState, doc: &mut Doc) {
    set(doc, "statistics", json!(c.statistics));
}

fn controller_v16(c: &ControllerState, doc: &mut Doc) {
    set(doc, "inclusionState", json!(c.inclusion_state));
}

fn controller_v22(c: &ControllerState, doc: &mut Doc) {
    set(doc, "rfRegion", json!(c.rf_region));
}

fn controller_v31(_: &ControllerState, doc: &mut Doc) {
    rename(doc, "isHealNetworkActive", "isRebuildingRoutes");
}

fn controller_v33(c: &ControllerState, doc: &mut Doc) {
    set(doc, "status", json!(c.status));
}

// ── node ────────────────────────────────────────────────────────────

const NODE_LADDER: &[(u32, Transform<NodeState>)] = &[
    (1, node_v1),
    (2, node_v2),
    (3, node_v3),
    (7, node_v7),
    (10, node_v10),
    (14, node_v14),
    (15, node_v15),
    (24, node_v24),
    (31, node_v31),
    (33, node_v33),
];

/// A node as embedded in the state document and in node events.
pub fn dump_node(node: &NodeState, schema: u32) -> Value {
    let mut doc = project(node, schema, node_base, NODE_LADDER);
    set(
        &mut doc,
        "endpoints",
        Value::Array(node.endpoints.iter().map(|e| dump_endpoint(e, schema)).collect()),
    );
    set(
        &mut doc,
        "values",
        Value::Array(node.values.iter().map(dump_value).collect()),
    );
    Value::Object(doc)
}

fn node_base(n: &NodeState) -> Doc {
    doc! {
        "nodeId": n.node_id,
        "index": 0,
        "installerIcon": n.installer_icon,
        "userIcon": n.user_icon,
        "status": n.status,
        "ready": n.ready,
        "isListening": n.is_listening,
        "isRouting": n.is_routing,
        "isSecure": n.is_secure,
        "manufacturerId": n.manufacturer_id,
        "productId": n.product_id,
        "productType": n.product_type,
        "firmwareVersion": n.firmware_version,
        "zwavePlusVersion": n.zwave_plus_version,
        "nodeType": n.node_type,
        "roleType": n.zwave_plus_role_type,
        "name": n.name,
        "location": n.location,
        "deviceConfig": n.device_config,
        "label": n.label,
        "interviewAttempts": n.interview_attempts,
        "interviewStage": n.interview_stage,
        "isFrequentListening": n.frequent_listening.is_some(),
        "maxBaudRate": n.max_data_rate,
        "version": n.protocol_version,
        "isBeaming": n.supports_beaming,
        "deviceClass": n.device_class,
        "commandClasses": n.command_classes,
    }
}

fn node_v1(n: &NodeState, doc: &mut Doc) {
    let listening = n
        .frequent_listening
        .map_or(Value::Bool(false), |f| json!(f.as_str()));
    set(doc, "isFrequentListening", listening);
    for superseded in ["maxBaudRate", "version", "isBeaming", "roleType"] {
        let _ = doc.remove(superseded);
    }
    set(doc, "maxDataRate", json!(n.max_data_rate));
    set(doc, "supportedDataRates", json!(n.supported_data_rates));
    set(doc, "protocolVersion", json!(n.protocol_version));
    set(doc, "supportsBeaming", json!(n.supports_beaming));
    set(doc, "supportsSecurity", json!(n.supports_security));
    set(doc, "zwavePlusNodeType", json!(n.zwave_plus_node_type));
    set(doc, "zwavePlusRoleType", json!(n.zwave_plus_role_type));
}

fn node_v2(n: &NodeState, doc: &mut Doc) {
    set(doc, "endpointCountIsDynamic", json!(n.endpoint_count_is_dynamic));
    set(
        doc,
        "endpointsHaveIdenticalCapabilities",
        json!(n.endpoints_have_identical_capabilities),
    );
    set(doc, "individualEndpointCount", json!(n.individual_endpoint_count));
    set(doc, "aggregatedEndpointCount", json!(n.aggregated_endpoint_count));
}

fn node_v3(n: &NodeState, doc: &mut Doc) {
    set(doc, "deviceDatabaseUrl", json!(device_database_url(n)));
}

fn node_v7(n: &NodeState, doc: &mut Doc) {
    set(doc, "statistics", json!(n.statistics));
}

fn node_v10(n: &NodeState, doc: &mut Doc) {
    set(doc, "highestSecurityClass", json!(n.highest_security_class));
}

fn node_v14(n: &NodeState, doc: &mut Doc) {
    set(doc, "isControllerNode", json!(n.is_controller_node));
    set(doc, "keepAwake", json!(n.keep_awake));
}

fn node_v15(n: &NodeState, doc: &mut Doc) {
    set(doc, "interviewStage", json!(n.interview_stage.label()));
}

fn node_v24(n: &NodeState, doc: &mut Doc) {
    set(doc, "defaultVolume", json!(n.default_volume));
    set(
        doc,
        "defaultTransitionDuration",
        json!(n.default_transition_duration),
    );
}

fn node_v31(n: &NodeState, doc: &mut Doc) {
    set(doc, "lastSeen", json!(n.last_seen.map(|t| t.to_rfc3339())));
    set(doc, "protocol", json!(n.protocol));
}

fn node_v33(n: &NodeState, doc: &mut Doc) {
    set(doc, "sdkVersion", json!(n.sdk_version));
}

/// Device database link, when the node's identity is known.
pub fn device_database_url(n: &NodeState) -> Option<String> {
    let (mid, ptype, pid) = (n.manufacturer_id?, n.product_type?, n.product_id?);
    let firmware = n.firmware_version.as_deref().unwrap_or("0.0");
    Some(format!(
        "https://devices.zwave-js.io/?jumpTo=0x{mid:04x}:0x{ptype:04x}:0x{pid:04x}:{firmware}"
    ))
}

// ── endpoint / value ────────────────────────────────────────────────

const ENDPOINT_LADDER: &[(u32, Transform<EndpointState>)] = &[(3, endpoint_v3)];

pub fn dump_endpoint(endpoint: &EndpointState, schema: u32) -> Value {
    Value::Object(project(endpoint, schema, endpoint_base, ENDPOINT_LADDER))
}

fn endpoint_base(e: &EndpointState) -> Doc {
    doc! {
        "nodeId": e.node_id,
        "index": e.index,
        "installerIcon": e.installer_icon,
        "userIcon": e.user_icon,
    }
}

fn endpoint_v3(e: &EndpointState, doc: &mut Doc) {
    set(doc, "deviceClass", json!(e.device_class));
    set(doc, "commandClasses", json!(e.command_classes));
}

/// Value dumps have the same shape at every schema version.
pub fn dump_value(value: &ValueState) -> Value {
    let mut doc = Doc::new();
    set(&mut doc, "endpoint", json!(value.id.endpoint));
    set(&mut doc, "commandClass", json!(value.id.command_class));
    set(&mut doc, "commandClassName", json!(value.command_class_name));
    set(&mut doc, "property", json!(value.id.property));
    if let Some(key) = &value.id.property_key {
        set(&mut doc, "propertyKey", json!(key));
    }
    set(&mut doc, "propertyName", json!(value.property_name));
    if let Some(name) = &value.property_key_name {
        set(&mut doc, "propertyKeyName", json!(name));
    }
    set(&mut doc, "ccVersion", json!(value.cc_version));
    set(&mut doc, "metadata", json!(value.metadata));
    if let Some(v) = &value.value {
        set(&mut doc, "value", v.clone());
    }
    Value::Object(doc)
}

/// Metadata reported for a value the node does not define.
pub fn default_metadata() -> ValueMetadata {
    ValueMetadata {
        value_type: "any".into(),
        readable: true,
        writeable: true,
        label: None,
        min: None,
        max: None,
        unit: None,
        states: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zwgate_core::model::{FrequentListening, InterviewStage, NodeStatus};
    use zwgate_core::sim::demo_node;
    use zwgate_core::{Driver, sim::SimulatedDriver};

    fn keys(value: &Value) -> Vec<String> {
        let mut keys: Vec<String> = value
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn is_sorted<T>(ladder: &[(u32, T)]) -> bool {
        ladder.windows(2).all(|w| w[0].0 < w[1].0)
    }

    #[test]
    fn ladders_are_strictly_ordered() {
        assert!(is_sorted(STATE_LADDER));
        assert!(is_sorted(CONTROLLER_LADDER));
        assert!(is_sorted(NODE_LADDER));
        assert!(is_sorted(ENDPOINT_LADDER));
    }

    #[test]
    fn state_sections() {
        let snapshot = SimulatedDriver::new(2).state();
        insta::assert_json_snapshot!(keys(&dump_state(&snapshot, 0)), @r#"
        [
          "controller",
          "nodes"
        ]
        "#);
        insta::assert_json_snapshot!(keys(&dump_state(&snapshot, 1)), @r#"
        [
          "controller",
          "driver",
          "nodes"
        ]
        "#);
    }

    #[test]
    fn node_fields_v0() {
        insta::assert_json_snapshot!(keys(&dump_node(&demo_node(2), 0)), @r#"
        [
          "commandClasses",
          "deviceClass",
          "deviceConfig",
          "endpoints",
          "firmwareVersion",
          "index",
          "installerIcon",
          "interviewAttempts",
          "interviewStage",
          "isBeaming",
          "isFrequentListening",
          "isListening",
          "isRouting",
          "isSecure",
          "label",
          "location",
          "manufacturerId",
          "maxBaudRate",
          "name",
          "nodeId",
          "nodeType",
          "productId",
          "productType",
          "ready",
          "roleType",
          "status",
          "userIcon",
          "values",
          "version",
          "zwavePlusVersion"
        ]
        "#);
    }

    #[test]
    fn node_fields_v2() {
        insta::assert_json_snapshot!(keys(&dump_node(&demo_node(2), 2)), @r#"
        [
          "aggregatedEndpointCount",
          "commandClasses",
          "deviceClass",
          "deviceConfig",
          "endpointCountIsDynamic",
          "endpoints",
          "endpointsHaveIdenticalCapabilities",
          "firmwareVersion",
          "index",
          "individualEndpointCount",
          "installerIcon",
          "interviewAttempts",
          "interviewStage",
          "isFrequentListening",
          "isListening",
          "isRouting",
          "isSecure",
          "label",
          "location",
          "manufacturerId",
          "maxDataRate",
          "name",
          "nodeId",
          "nodeType",
          "productId",
          "productType",
          "protocolVersion",
          "ready",
          "status",
          "supportedDataRates",
          "supportsBeaming",
          "supportsSecurity",
          "userIcon",
          "values",
          "zwavePlusNodeType",
          "zwavePlusRoleType",
          "zwavePlusVersion"
        ]
        "#);
    }

    #[test]
    fn node_fields_v3_add_database_url() {
        let v2 = keys(&dump_node(&demo_node(2), 2));
        let v3 = keys(&dump_node(&demo_node(2), 3));
        let added: Vec<&String> = v3.iter().filter(|k| !v2.contains(k)).collect();
        assert_eq!(added, ["deviceDatabaseUrl"]);
        assert_eq!(v3.len(), v2.len() + 1);
    }

    #[test]
    fn node_fields_v14() {
        insta::assert_json_snapshot!(keys(&dump_node(&demo_node(2), 14)), @r#"
        [
          "aggregatedEndpointCount",
          "commandClasses",
          "deviceClass",
          "deviceConfig",
          "deviceDatabaseUrl",
          "endpointCountIsDynamic",
          "endpoints",
          "endpointsHaveIdenticalCapabilities",
          "firmwareVersion",
          "highestSecurityClass",
          "index",
          "individualEndpointCount",
          "installerIcon",
          "interviewAttempts",
          "interviewStage",
          "isControllerNode",
          "isFrequentListening",
          "isListening",
          "isRouting",
          "isSecure",
          "keepAwake",
          "label",
          "location",
          "manufacturerId",
          "maxDataRate",
          "name",
          "nodeId",
          "nodeType",
          "productId",
          "productType",
          "protocolVersion",
          "ready",
          "statistics",
          "status",
          "supportedDataRates",
          "supportsBeaming",
          "supportsSecurity",
          "userIcon",
          "values",
          "zwavePlusNodeType",
          "zwavePlusRoleType",
          "zwavePlusVersion"
        ]
        "#);
    }

    #[test]
    fn interview_stage_becomes_name_at_v15() {
        let mut node = demo_node(2);
        node.interview_stage = InterviewStage::Complete;
        let v14 = dump_node(&node, 14);
        let v15 = dump_node(&node, 15);
        assert_eq!(v14["interviewStage"], 5);
        assert_eq!(v15["interviewStage"], "Complete");
        assert_eq!(keys(&v14), keys(&v15));
    }

    #[test]
    fn frequent_listening_shape() {
        let mut node = demo_node(3);
        node.frequent_listening = Some(FrequentListening::Every250ms);
        assert_eq!(dump_node(&node, 0)["isFrequentListening"], true);
        assert_eq!(dump_node(&node, 1)["isFrequentListening"], "250ms");
        node.frequent_listening = None;
        assert_eq!(dump_node(&node, 1)["isFrequentListening"], false);
    }

    #[test]
    fn latest_node_fields() {
        let doc = dump_node(&demo_node(2), 33);
        for key in [
            "defaultVolume",
            "defaultTransitionDuration",
            "lastSeen",
            "protocol",
            "sdkVersion",
        ] {
            assert!(doc.get(key).is_some(), "missing {key}");
        }
        assert!(dump_node(&demo_node(2), 30).get("lastSeen").is_none());
    }

    #[test]
    fn controller_fields_v0() {
        let controller = SimulatedDriver::new(0).state().controller;
        insta::assert_json_snapshot!(keys(&dump_controller(&controller, 0)), @r#"
        [
          "homeId",
          "isHealNetworkActive",
          "isSISPresent",
          "isSecondary",
          "isSlave",
          "isStaticUpdateController",
          "isUsingHomeIdFromOtherNetwork",
          "libraryVersion",
          "manufacturerId",
          "ownNodeId",
          "productId",
          "productType",
          "serialApiVersion",
          "sucNodeId",
          "supportedFunctionTypes",
          "supportsTimers",
          "type",
          "wasRealPrimary"
        ]
        "#);
    }

    #[test]
    fn controller_fields_v33() {
        let controller = SimulatedDriver::new(0).state().controller;
        insta::assert_json_snapshot!(keys(&dump_controller(&controller, 33)), @r#"
        [
          "homeId",
          "inclusionState",
          "isRebuildingRoutes",
          "isSISPresent",
          "isSecondary",
          "isSlave",
          "isStaticUpdateController",
          "isUsingHomeIdFromOtherNetwork",
          "libraryVersion",
          "manufacturerId",
          "ownNodeId",
          "productId",
          "productType",
          "rfRegion",
          "serialApiVersion",
          "statistics",
          "status",
          "sucNodeId",
          "supportedFunctionTypes",
          "supportsTimers",
          "type",
          "wasRealPrimary"
        ]
        "#);
    }

    #[test]
    fn heal_flag_renamed_at_v31() {
        let mut controller = SimulatedDriver::new(0).state().controller;
        controller.is_heal_network_active = true;
        assert_eq!(dump_controller(&controller, 30)["isHealNetworkActive"], true);
        let v31 = dump_controller(&controller, 31);
        assert_eq!(v31["isRebuildingRoutes"], true);
        assert!(v31.get("isHealNetworkActive").is_none());
    }

    #[test]
    fn endpoint_gains_capabilities_at_v3() {
        let node = demo_node(2);
        let endpoint = &node.endpoints[0];
        assert!(dump_endpoint(endpoint, 2).get("commandClasses").is_none());
        let v3 = dump_endpoint(endpoint, 3);
        assert!(v3["commandClasses"].is_array());
        assert_eq!(v3["index"], 1);
    }

    #[test]
    fn database_url_format() {
        let mut node = demo_node(2);
        node.manufacturer_id = Some(0x0086);
        node.product_type = Some(0x0003);
        node.product_id = Some(0x0060);
        node.firmware_version = Some("1.4".into());
        assert_eq!(
            device_database_url(&node).as_deref(),
            Some("https://devices.zwave-js.io/?jumpTo=0x0086:0x0003:0x0060:1.4")
        );
        node.firmware_version = None;
        assert!(device_database_url(&node).unwrap().ends_with(":0.0"));
        node.product_id = None;
        assert!(device_database_url(&node).is_none());
    }

    #[test]
    fn value_dump_omits_absent_keys() {
        let node = demo_node(3);
        let dump = dump_value(&node.values[0]);
        assert!(dump.get("propertyKey").is_none());
        assert!(dump.get("commandClassName").is_some());
        assert!(dump["metadata"].is_object());
    }

    #[test]
    fn rendering_is_byte_identical() {
        let snapshot = SimulatedDriver::new(4).state();
        for schema in [0, 3, 15, 33] {
            let a = serde_json::to_string(&dump_state(&snapshot, schema)).unwrap();
            let b = serde_json::to_string(&dump_state(&snapshot, schema)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn rendering_does_not_touch_source() {
        let mut node = demo_node(2);
        node.status = NodeStatus::Dead;
        let before = node.clone();
        let _ = dump_node(&node, 0);
        let _ = dump_node(&node, 33);
        assert_eq!(node, before);
    }

    proptest! {
        #[test]
        fn node_fields_only_grow_after_v3(schema in 3u32..33) {
            let node = demo_node(2);
            let lower = keys(&dump_node(&node, schema));
            let higher = keys(&dump_node(&node, schema + 1));
            prop_assert!(lower.iter().all(|k| higher.contains(k)));
        }

        #[test]
        fn shape_depends_only_on_version(schema in 0u32..=33, nodes in 0u16..6) {
            let snapshot = SimulatedDriver::new(nodes).state();
            prop_assert_eq!(dump_state(&snapshot, schema), dump_state(&snapshot.clone(), schema));
        }
    }
}
