//! In-memory driver.
//!
//! Backs the demo binary and the server's tests. It keeps a small seeded
//! network and emits the same events a radio-backed driver would for the
//! operations it supports.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::driver::{Driver, InclusionUserCallbacks};
use crate::errors::{DriverError, ZWaveErrorCode};
use crate::events::{
    ControllerEvent, DriverEvent, NodeEvent, RebuildStatus, SequencedEvent, ValueChange,
};
use crate::logging::{LogConfig, LogConfigUpdate, LogEntry, LogLevel};
use crate::model::{
    CommandClassInfo, ControllerState, DeviceClass, DeviceClassRef, DeviceConfig, DriverSnapshot,
    EndpointState, FrequentListening, InclusionGrant, InclusionOptions, InclusionState,
    InclusionStrategy, InterviewStage, NodeId, NodeState, NodeStatus, RemoveNodeReason,
    SecurityClass, ValueId, ValueMetadata, ValueState,
};

pub const SIM_DRIVER_VERSION: &str = "12.4.0-sim";
pub const SIM_HOME_ID: u32 = 0xE2F5_6A01;
/// Device key shown to the user during S2 bootstrapping, first block masked.
pub const SIM_DSK: &str = "xxxxx-60308-13093-51862-47405-39436-02416-39925";
/// The five digits that complete [`SIM_DSK`].
pub const SIM_DSK_PIN: &str = "11536";

const EVENT_CAPACITY: usize = 256;
const LOG_CAPACITY: usize = 512;

struct SimState {
    controller: ControllerState,
    nodes: BTreeMap<NodeId, NodeState>,
    log_config: LogConfig,
    statistics_enabled: bool,
    event_seq: u64,
}

struct Shared {
    state: Mutex<SimState>,
    events: broadcast::Sender<SequencedEvent>,
    logs: broadcast::Sender<LogEntry>,
}

impl Shared {
    fn emit(&self, event: DriverEvent) {
        let mut state = self.state.lock();
        self.publish(&mut state, event);
    }

    /// Number and send `event` while the caller holds the state lock, in
    /// the same critical section as the change it reports.
    fn publish(&self, state: &mut SimState, event: DriverEvent) {
        state.event_seq += 1;
        // No receivers is fine.
        let _ = self.events.send(SequencedEvent {
            seq: state.event_seq,
            event,
        });
    }

    fn log(&self, entry: LogEntry) {
        let config = self.state.lock().log_config.clone();
        if config.enabled && entry.level.passes(config.level) {
            let _ = self.logs.send(entry);
        }
    }

    /// Return to idle and report how the inclusion ended.
    fn finish_inclusion(&self, outcome: ControllerEvent) {
        let mut state = self.state.lock();
        state.controller.inclusion_state = InclusionState::Idle;
        self.publish(&mut state, DriverEvent::Controller(outcome));
    }

    fn insert_node(&self, node: NodeState, low_security: bool) {
        let node_id = node.node_id;
        {
            let mut state = self.state.lock();
            let _ = state.nodes.insert(node_id, node.clone());
            self.publish(
                &mut state,
                DriverEvent::Controller(ControllerEvent::NodeAdded {
                    node: Box::new(node),
                    low_security,
                }),
            );
        }
        self.log(LogEntry::new(LogLevel::Info, "CNTRLR", format!("Node {node_id} was added")));
    }

    fn next_node_id(&self) -> NodeId {
        let state = self.state.lock();
        (2..=232)
            .find(|id| !state.nodes.contains_key(id))
            .unwrap_or(232)
    }
}

/// A [`Driver`] that keeps its network in memory.
pub struct SimulatedDriver {
    shared: Arc<Shared>,
}

impl SimulatedDriver {
    /// Seeds the controller plus `node_count` demo nodes.
    pub fn new(node_count: u16) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (logs, _) = broadcast::channel(LOG_CAPACITY);

        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(1, controller_node());
        for node_id in 2..node_count.saturating_add(2) {
            let _ = nodes.insert(node_id, demo_node(node_id));
        }

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    controller: demo_controller(),
                    nodes,
                    log_config: LogConfig::default(),
                    statistics_enabled: false,
                    event_seq: 0,
                }),
                events,
                logs,
            }),
        }
    }

    /// Push an arbitrary event to subscribers.
    pub fn emit(&self, event: DriverEvent) {
        self.shared.emit(event);
    }

    /// Push a log line, subject to the current log configuration.
    pub fn log(&self, entry: LogEntry) {
        self.shared.log(entry);
    }

    /// Add a node as if it had just been included.
    pub fn add_node(&self, node: NodeState) {
        self.shared.insert_node(node, false);
    }

    pub fn set_node_status(&self, node_id: NodeId, status: NodeStatus) {
        if let Some(node) = self.shared.state.lock().nodes.get_mut(&node_id) {
            node.status = status;
        }
    }

    /// Change a value without going through `set_value` (an unsolicited report).
    pub fn report_value(&self, node_id: NodeId, id: &ValueId, new_value: serde_json::Value) {
        let mut state = self.shared.state.lock();
        let Some(value) = state.nodes.get_mut(&node_id).and_then(|n| n.value_mut(id)) else {
            return;
        };
        let prev = value.value.replace(new_value.clone());
        let change = value_change(value, prev, Some(new_value));
        self.shared
            .publish(&mut state, DriverEvent::node(node_id, NodeEvent::ValueUpdated(change)));
    }

    fn require_node(&self, node_id: NodeId) -> Result<NodeState, DriverError> {
        self.node(node_id).ok_or_else(|| {
            DriverError::new(
                ZWaveErrorCode::ControllerNodeNotFound,
                format!("Node {node_id} was not found"),
            )
        })
    }
}

fn value_change(
    value: &ValueState,
    prev_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
) -> ValueChange {
    ValueChange {
        id: value.id.clone(),
        command_class_name: value.command_class_name.clone(),
        property_name: value.property_name.clone(),
        property_key_name: value.property_key_name.clone(),
        prev_value,
        new_value,
    }
}

#[async_trait]
impl Driver for SimulatedDriver {
    fn driver_version(&self) -> &str {
        SIM_DRIVER_VERSION
    }

    fn home_id(&self) -> Option<u32> {
        self.shared.state.lock().controller.home_id
    }

    fn state(&self) -> DriverSnapshot {
        let state = self.shared.state.lock();
        DriverSnapshot {
            log_config: state.log_config.clone(),
            statistics_enabled: state.statistics_enabled,
            controller: state.controller.clone(),
            nodes: state.nodes.values().cloned().collect(),
            event_seq: state.event_seq,
        }
    }

    fn node(&self, node_id: NodeId) -> Option<NodeState> {
        self.shared.state.lock().nodes.get(&node_id).cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.shared.events.subscribe()
    }

    fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.shared.logs.subscribe()
    }

    fn log_config(&self) -> LogConfig {
        self.shared.state.lock().log_config.clone()
    }

    fn update_log_config(&self, update: &LogConfigUpdate) -> LogConfig {
        let (changed, config) = {
            let mut state = self.shared.state.lock();
            let changed = state.log_config.apply(update);
            (changed, state.log_config.clone())
        };
        if changed {
            debug!(level = ?config.level, enabled = config.enabled, "log config updated");
            self.shared.log(LogEntry::new(
                LogLevel::Info,
                "DRIVER",
                "Logging configuration updated",
            ));
        }
        config
    }

    fn is_statistics_enabled(&self) -> bool {
        self.shared.state.lock().statistics_enabled
    }

    async fn enable_statistics(
        &self,
        application_name: &str,
        application_version: &str,
    ) -> Result<(), DriverError> {
        if application_name.is_empty() || application_version.is_empty() {
            return Err(DriverError::invalid_argument(
                "applicationName and applicationVersion must not be empty",
            ));
        }
        self.shared.state.lock().statistics_enabled = true;
        self.shared.log(LogEntry::new(
            LogLevel::Info,
            "DRIVER",
            format!("Usage statistics enabled for {application_name} {application_version}"),
        ));
        Ok(())
    }

    async fn disable_statistics(&self) -> Result<(), DriverError> {
        self.shared.state.lock().statistics_enabled = false;
        Ok(())
    }

    async fn begin_inclusion(
        &self,
        options: InclusionOptions,
        callbacks: Arc<dyn InclusionUserCallbacks>,
    ) -> Result<bool, DriverError> {
        let secure = options.strategy != InclusionStrategy::Insecure;
        {
            let mut state = self.shared.state.lock();
            if state.controller.inclusion_state != InclusionState::Idle {
                return Ok(false);
            }
            state.controller.inclusion_state = InclusionState::Including;
            self.shared.publish(
                &mut state,
                DriverEvent::Controller(ControllerEvent::InclusionStarted { secure }),
            );
        }

        if options.strategy == InclusionStrategy::SecurityS2 {
            let shared = Arc::clone(&self.shared);
            let node_id = shared.next_node_id();
            drop(tokio::spawn(bootstrap_s2(shared, node_id, callbacks)));
        }
        Ok(true)
    }

    async fn stop_inclusion(&self) -> Result<bool, DriverError> {
        let mut state = self.shared.state.lock();
        if state.controller.inclusion_state != InclusionState::Including {
            return Ok(false);
        }
        state.controller.inclusion_state = InclusionState::Idle;
        self.shared
            .publish(&mut state, DriverEvent::Controller(ControllerEvent::InclusionStopped));
        Ok(true)
    }

    async fn begin_exclusion(&self) -> Result<bool, DriverError> {
        let mut state = self.shared.state.lock();
        if state.controller.inclusion_state != InclusionState::Idle {
            return Ok(false);
        }
        state.controller.inclusion_state = InclusionState::Excluding;
        self.shared
            .publish(&mut state, DriverEvent::Controller(ControllerEvent::ExclusionStarted));
        Ok(true)
    }

    async fn stop_exclusion(&self) -> Result<bool, DriverError> {
        let mut state = self.shared.state.lock();
        if state.controller.inclusion_state != InclusionState::Excluding {
            return Ok(false);
        }
        state.controller.inclusion_state = InclusionState::Idle;
        self.shared
            .publish(&mut state, DriverEvent::Controller(ControllerEvent::ExclusionStopped));
        Ok(true)
    }

    async fn begin_healing_network(&self) -> Result<bool, DriverError> {
        let progress: BTreeMap<NodeId, RebuildStatus> = {
            let mut state = self.shared.state.lock();
            if state.controller.is_heal_network_active {
                return Ok(false);
            }
            state.controller.is_heal_network_active = true;
            let progress: BTreeMap<NodeId, RebuildStatus> = state
                .nodes
                .values()
                .filter(|n| !n.is_controller_node)
                .map(|n| (n.node_id, RebuildStatus::Pending))
                .collect();
            self.shared.publish(
                &mut state,
                DriverEvent::Controller(ControllerEvent::HealNetworkProgress {
                    progress: progress.clone(),
                }),
            );
            progress
        };
        drop(tokio::spawn(rebuild_routes(Arc::clone(&self.shared), progress)));
        Ok(true)
    }

    async fn stop_healing_network(&self) -> Result<bool, DriverError> {
        let mut state = self.shared.state.lock();
        let was_active = state.controller.is_heal_network_active;
        state.controller.is_heal_network_active = false;
        Ok(was_active)
    }

    async fn remove_failed_node(&self, node_id: NodeId) -> Result<(), DriverError> {
        let node = self.require_node(node_id)?;
        if node.status != NodeStatus::Dead {
            return Err(DriverError::new(
                ZWaveErrorCode::ControllerExclusionFailed,
                format!("The node removal process failed: node {node_id} is responding"),
            ));
        }
        let mut state = self.shared.state.lock();
        let _ = state.nodes.remove(&node_id);
        self.shared.publish(
            &mut state,
            DriverEvent::Controller(ControllerEvent::NodeRemoved {
                node: Box::new(node),
                reason: RemoveNodeReason::RemoveFailed,
            }),
        );
        Ok(())
    }

    async fn set_value(
        &self,
        node_id: NodeId,
        value_id: &ValueId,
        value: serde_json::Value,
    ) -> Result<bool, DriverError> {
        let mut state = self.shared.state.lock();
        let change = {
            let node = state.nodes.get_mut(&node_id).ok_or_else(|| {
                DriverError::new(
                    ZWaveErrorCode::ControllerNodeNotFound,
                    format!("Node {node_id} was not found"),
                )
            })?;
            if node.status == NodeStatus::Dead {
                return Err(DriverError::new(
                    ZWaveErrorCode::ControllerNodeNotResponding,
                    format!("Node {node_id} did not respond"),
                ));
            }
            node.statistics.commands_tx += 1;
            node.last_seen = Some(Utc::now());
            let Some(current) = node.value_mut(value_id) else {
                return Err(DriverError::invalid_argument(format!(
                    "Value {value_id} does not exist on node {node_id}"
                )));
            };
            if !current.metadata.writeable {
                return Err(DriverError::invalid_argument(format!(
                    "Value {value_id} is read-only"
                )));
            }
            let prev = current.value.replace(value.clone());
            value_change(current, prev, Some(value))
        };
        self.shared
            .publish(&mut state, DriverEvent::node(node_id, NodeEvent::ValueUpdated(change)));
        Ok(true)
    }

    async fn refresh_info(&self, node_id: NodeId) -> Result<(), DriverError> {
        let _ = self.require_node(node_id)?;
        self.shared
            .emit(DriverEvent::node(node_id, NodeEvent::InterviewStarted));
        for stage in [
            InterviewStage::ProtocolInfo,
            InterviewStage::NodeInfo,
            InterviewStage::CommandClasses,
        ] {
            self.shared.emit(DriverEvent::node(
                node_id,
                NodeEvent::InterviewStageCompleted { stage },
            ));
        }
        let mut state = self.shared.state.lock();
        let Some(node) = state.nodes.get_mut(&node_id) else {
            return Ok(());
        };
        node.interview_stage = InterviewStage::Complete;
        node.interview_attempts += 1;
        node.ready = true;
        let node = node.clone();
        self.shared
            .publish(&mut state, DriverEvent::node(node_id, NodeEvent::InterviewCompleted));
        self.shared.publish(
            &mut state,
            DriverEvent::node(
                node_id,
                NodeEvent::Ready {
                    node: Box::new(node),
                },
            ),
        );
        Ok(())
    }

    async fn ping(&self, node_id: NodeId) -> Result<bool, DriverError> {
        let node = self.require_node(node_id)?;
        Ok(node.status != NodeStatus::Dead)
    }

    fn set_name(&self, node_id: NodeId, name: String) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock();
        match state.nodes.get_mut(&node_id) {
            Some(node) => {
                node.name = Some(name);
                Ok(())
            }
            None => Err(DriverError::new(
                ZWaveErrorCode::ControllerNodeNotFound,
                format!("Node {node_id} was not found"),
            )),
        }
    }

    fn set_location(&self, node_id: NodeId, location: String) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock();
        match state.nodes.get_mut(&node_id) {
            Some(node) => {
                node.location = Some(location);
                Ok(())
            }
            None => Err(DriverError::new(
                ZWaveErrorCode::ControllerNodeNotFound,
                format!("Node {node_id} was not found"),
            )),
        }
    }
}

/// S2 bootstrapping: ask for the classes to grant, then for the PIN.
async fn bootstrap_s2(
    shared: Arc<Shared>,
    node_id: NodeId,
    callbacks: Arc<dyn InclusionUserCallbacks>,
) {
    let requested = InclusionGrant {
        security_classes: vec![
            SecurityClass::S2Unauthenticated,
            SecurityClass::S2Authenticated,
        ],
        client_side_auth: false,
    };
    let Some(grant) = callbacks.grant_security_classes(requested).await else {
        abort_inclusion(&shared, callbacks.as_ref());
        return;
    };

    let needs_pin = grant.security_classes.iter().any(|c| {
        matches!(
            c,
            SecurityClass::S2Authenticated | SecurityClass::S2AccessControl
        )
    });
    let mut low_security = grant.security_classes.is_empty();
    if needs_pin {
        let Some(pin) = callbacks.validate_dsk_and_enter_pin(SIM_DSK.to_owned()).await else {
            abort_inclusion(&shared, callbacks.as_ref());
            return;
        };
        low_security = pin != SIM_DSK_PIN;
    }

    let mut node = demo_node(node_id);
    node.highest_security_class = if low_security {
        None
    } else {
        grant.security_classes.iter().copied().max_by_key(|c| match c {
            SecurityClass::S0Legacy => -1,
            other => other.value(),
        })
    };
    node.is_secure = Some(!low_security);

    shared.insert_node(node, low_security);
    shared.finish_inclusion(ControllerEvent::InclusionStopped);
}

fn abort_inclusion(shared: &Shared, callbacks: &dyn InclusionUserCallbacks) {
    shared.log(LogEntry::new(
        LogLevel::Warn,
        "CNTRLR",
        "Security bootstrapping was aborted",
    ));
    callbacks.abort();
    shared.finish_inclusion(ControllerEvent::InclusionFailed);
}

async fn rebuild_routes(shared: Arc<Shared>, mut progress: BTreeMap<NodeId, RebuildStatus>) {
    let node_ids: Vec<NodeId> = progress.keys().copied().collect();
    for node_id in node_ids {
        tokio::task::yield_now().await;
        let status = {
            let state = shared.state.lock();
            if !state.controller.is_heal_network_active {
                return;
            }
            match state.nodes.get(&node_id).map(|n| n.status) {
                Some(NodeStatus::Dead) => RebuildStatus::Failed,
                Some(NodeStatus::Asleep) => RebuildStatus::Skipped,
                Some(_) => RebuildStatus::Done,
                None => RebuildStatus::Skipped,
            }
        };
        let _ = progress.insert(node_id, status);
        shared.emit(DriverEvent::Controller(ControllerEvent::HealNetworkProgress {
            progress: progress.clone(),
        }));
    }
    let mut state = shared.state.lock();
    state.controller.is_heal_network_active = false;
    shared.publish(
        &mut state,
        DriverEvent::Controller(ControllerEvent::HealNetworkDone { result: progress }),
    );
}

fn class_ref(key: u8, label: &str) -> DeviceClassRef {
    DeviceClassRef {
        key,
        label: label.to_owned(),
    }
}

fn cc(id: u8, name: &str, version: u8) -> CommandClassInfo {
    CommandClassInfo {
        id,
        name: name.to_owned(),
        version,
        is_secure: false,
    }
}

fn demo_controller() -> ControllerState {
    ControllerState {
        library_version: Some("Z-Wave 7.18".into()),
        controller_type: Some(1),
        home_id: Some(SIM_HOME_ID),
        own_node_id: Some(1),
        is_secondary: Some(false),
        is_using_home_id_from_other_network: Some(false),
        is_sis_present: Some(true),
        was_real_primary: Some(true),
        is_static_update_controller: Some(true),
        is_slave: Some(false),
        serial_api_version: Some("1.0".into()),
        manufacturer_id: Some(0x0086),
        product_type: Some(0x0001),
        product_id: Some(0x005a),
        supported_function_types: vec![2, 3, 4, 5, 6, 7, 8, 9, 16, 17, 18, 19, 32, 65, 74, 75],
        suc_node_id: Some(1),
        supports_timers: Some(false),
        rf_region: Some(0),
        ..ControllerState::default()
    }
}

fn controller_node() -> NodeState {
    let mut node = NodeState::new(1);
    node.status = NodeStatus::Alive;
    node.ready = true;
    node.is_listening = Some(true);
    node.is_routing = Some(false);
    node.is_controller_node = true;
    node.manufacturer_id = Some(0x0086);
    node.product_type = Some(0x0001);
    node.product_id = Some(0x005a);
    node.firmware_version = Some("7.18".into());
    node.sdk_version = Some("7.18.3".into());
    node.protocol_version = Some(3);
    node.interview_stage = InterviewStage::Complete;
    node.device_class = Some(DeviceClass {
        basic: class_ref(0x02, "Static Controller"),
        generic: class_ref(0x02, "Static Controller"),
        specific: class_ref(0x01, "PC Controller"),
    });
    node
}

/// A switch (even ids) or a battery sensor (odd ids) in a finished state.
pub fn demo_node(node_id: NodeId) -> NodeState {
    let mut node = NodeState::new(node_id);
    node.ready = true;
    node.interview_stage = InterviewStage::Complete;
    node.interview_attempts = 1;
    node.is_routing = Some(true);
    node.is_secure = Some(false);
    node.protocol_version = Some(3);
    node.max_data_rate = Some(100_000);
    node.supported_data_rates = vec![40_000, 100_000];
    node.supports_beaming = Some(true);
    node.supports_security = Some(false);
    node.zwave_plus_version = Some(2);
    node.zwave_plus_node_type = Some(0);
    node.zwave_plus_role_type = Some(5);
    node.node_type = Some(1);
    node.firmware_version = Some("1.4".into());
    node.sdk_version = Some("7.15.4".into());
    node.last_seen = Some(Utc::now());
    node.endpoint_count_is_dynamic = Some(false);
    node.endpoints_have_identical_capabilities = Some(true);

    if node_id % 2 == 0 {
        node.status = NodeStatus::Alive;
        node.is_listening = Some(true);
        node.manufacturer_id = Some(0x0371);
        node.product_type = Some(0x0003);
        node.product_id = Some(0x00af);
        node.label = Some("ZWA023".into());
        node.installer_icon = Some(0x0700);
        node.user_icon = Some(0x0700);
        node.device_config = Some(DeviceConfig {
            manufacturer: "Aeotec Ltd.".into(),
            label: "ZWA023".into(),
            description: "Smart Switch 7".into(),
        });
        node.device_class = Some(DeviceClass {
            basic: class_ref(0x04, "Routing Slave"),
            generic: class_ref(0x10, "Binary Switch"),
            specific: class_ref(0x01, "Binary Power Switch"),
        });
        node.command_classes = vec![
            cc(0x25, "Binary Switch", 2),
            cc(0x5e, "Z-Wave Plus Info", 2),
            cc(0x86, "Version", 3),
        ];
        node.individual_endpoint_count = Some(1);
        node.aggregated_endpoint_count = Some(0);
        node.endpoints = vec![EndpointState {
            node_id,
            index: 1,
            installer_icon: Some(0x0700),
            user_icon: Some(0x0700),
            device_class: node.device_class.clone(),
            command_classes: vec![cc(0x25, "Binary Switch", 2)],
        }];
        node.default_transition_duration = Some("1s".into());
        node.values = vec![
            ValueState {
                id: ValueId::new(0x25, "currentValue"),
                command_class_name: "Binary Switch".into(),
                property_name: Some("currentValue".into()),
                property_key_name: None,
                cc_version: 2,
                metadata: ValueMetadata::boolean("Current value", false),
                value: Some(serde_json::Value::Bool(false)),
            },
            ValueState {
                id: ValueId::new(0x25, "targetValue"),
                command_class_name: "Binary Switch".into(),
                property_name: Some("targetValue".into()),
                property_key_name: None,
                cc_version: 2,
                metadata: ValueMetadata::boolean("Target value", true),
                value: Some(serde_json::Value::Bool(false)),
            },
        ];
    } else {
        node.status = NodeStatus::Asleep;
        node.is_listening = Some(false);
        node.frequent_listening = Some(FrequentListening::Every1000ms);
        node.manufacturer_id = Some(0x0086);
        node.product_type = Some(0x0102);
        node.product_id = Some(0x0064);
        node.label = Some("ZW100".into());
        node.installer_icon = Some(0x0c07);
        node.user_icon = Some(0x0c07);
        node.device_config = Some(DeviceConfig {
            manufacturer: "Aeotec Ltd.".into(),
            label: "ZW100".into(),
            description: "MultiSensor 6".into(),
        });
        node.device_class = Some(DeviceClass {
            basic: class_ref(0x04, "Routing Slave"),
            generic: class_ref(0x21, "Multilevel Sensor"),
            specific: class_ref(0x01, "Routing Multilevel Sensor"),
        });
        node.command_classes = vec![
            cc(0x31, "Multilevel Sensor", 7),
            cc(0x80, "Battery", 1),
            cc(0x84, "Wake Up", 2),
        ];
        node.individual_endpoint_count = Some(0);
        node.aggregated_endpoint_count = Some(0);
        node.values = vec![
            ValueState {
                id: ValueId::new(0x31, "Air temperature"),
                command_class_name: "Multilevel Sensor".into(),
                property_name: Some("Air temperature".into()),
                property_key_name: None,
                cc_version: 7,
                metadata: ValueMetadata {
                    writeable: false,
                    ..ValueMetadata::number("Air temperature", -40.0, 100.0, Some("°C"))
                },
                value: Some(serde_json::json!(21.5)),
            },
            ValueState {
                id: ValueId::new(0x80, "level"),
                command_class_name: "Battery".into(),
                property_name: Some("level".into()),
                property_key_name: None,
                cc_version: 1,
                metadata: ValueMetadata {
                    writeable: false,
                    ..ValueMetadata::number("Battery level", 0.0, 100.0, Some("%"))
                },
                value: Some(serde_json::json!(87)),
            },
        ];
    }
    node
}
