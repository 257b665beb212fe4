//! Live sessions and the resources they share.
//!
//! The registry owns the driver handle, the event and log forwarders, the
//! decision slots and the session map. Fan-out and `start_listening` run
//! under one gate so a session's state snapshot and the moment it starts
//! receiving events commit together.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zwgate_core::logging::LogEntry;
use zwgate_core::{Driver, SequencedEvent};

use crate::decision::{DecisionHub, InclusionBroker};
use crate::events::{render_event, render_log};
use crate::ids::SessionId;
use crate::protocol::incoming::LogFilter;
use crate::protocol::outgoing::{OutgoingMessage, ResultMessage, VersionMessage};
use crate::protocol::{CommandError, SERVER_VERSION};
use crate::state::dump_state;
use crate::websocket::event_forwarder::spawn_event_forwarder;
use crate::websocket::log_forwarder::spawn_log_forwarder;
use crate::websocket::session::{Probe, Session};

/// Values threaded into the registry at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub min_schema_version: u32,
    pub max_schema_version: u32,
    pub outbound_queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_schema_version: crate::protocol::MIN_SCHEMA_VERSION,
            max_schema_version: crate::protocol::MAX_SCHEMA_VERSION,
            outbound_queue_capacity: 1024,
        }
    }
}

struct ForwarderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ForwarderHandle {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    fn stop(self) {
        self.cancel.cancel();
    }
}

/// Why `start_listening` did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("state reply could not be queued")]
    QueueFull,
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct SessionRegistry {
    driver: Arc<dyn Driver>,
    config: RegistryConfig,
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Held while events are queued and while a session starts listening.
    fanout: Mutex<()>,
    decisions: DecisionHub,
    event_forwarder: Mutex<Option<ForwarderHandle>>,
    log_forwarder: Mutex<Option<ForwarderHandle>>,
    this: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(driver: Arc<dyn Driver>, config: RegistryConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            driver,
            config,
            sessions: DashMap::new(),
            fanout: Mutex::new(()),
            decisions: DecisionHub::new(),
            event_forwarder: Mutex::new(None),
            log_forwarder: Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn decisions(&self) -> &DecisionHub {
        &self.decisions
    }

    // ── sessions ────────────────────────────────────────────────────

    /// Add a session. The first one starts the event forwarder.
    pub fn register(&self, session: Arc<Session>) {
        self.ensure_event_forwarder();
        if self.sessions.insert(session.id.clone(), session).is_none() {
            gauge!("ws_connections_active").increment(1.0);
        }
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn unregister(&self, id: &SessionId) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.close();
        gauge!("ws_connections_active").decrement(1.0);
        if session.receives_logs() {
            self.release_log_forwarder_if_idle();
        }
        true
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn listening_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.receives_events()).count()
    }

    /// First frame of every connection.
    pub fn version_message(&self) -> OutgoingMessage {
        OutgoingMessage::Version(VersionMessage {
            driver_version: self.driver.driver_version().to_owned(),
            server_version: SERVER_VERSION.to_owned(),
            home_id: self.driver.home_id(),
            min_schema_version: self.config.min_schema_version,
            max_schema_version: self.config.max_schema_version,
        })
    }

    // ── handshake ───────────────────────────────────────────────────

    /// Store `requested` as the session's schema if it is supported.
    /// Nothing changes on failure.
    pub fn negotiate_schema(&self, session: &Session, requested: i64) -> Result<(), CommandError> {
        let incompatible = || CommandError::SchemaIncompatible {
            requested,
            min: self.config.min_schema_version,
            max: self.config.max_schema_version,
        };
        let version = u32::try_from(requested).map_err(|_| incompatible())?;
        if version < self.config.min_schema_version || version > self.config.max_schema_version {
            return Err(incompatible());
        }
        debug!(session_id = %session.id, schema_version = version, "schema negotiated");
        session.set_schema_version(version);
        Ok(())
    }

    /// Reply to `start_listening` with the full state and enable events.
    ///
    /// Runs under the fan-out gate, so every event queued for this session
    /// lands after the reply. Events the snapshot already covers (position
    /// at or below its `event_seq`) are skipped for this session even when
    /// the forwarder has not consumed them yet.
    pub fn start_listening(&self, session: &Session, message_id: &str) -> Result<(), ListenError> {
        let _gate = self.fanout.lock();
        let schema = session.schema_version();
        let snapshot = self.driver.state();
        let reply: OutgoingMessage =
            ResultMessage::success(message_id, json!({ "state": dump_state(&snapshot, schema) }))
                .into();
        let text = reply.to_text()?;
        if !session.try_send_reply(text) {
            return Err(ListenError::QueueFull);
        }
        session.enable_events_after(snapshot.event_seq);
        info!(
            session_id = %session.id,
            schema_version = schema,
            nodes = snapshot.nodes.len(),
            event_seq = snapshot.event_seq,
            "session listening"
        );
        Ok(())
    }

    // ── fan-out ─────────────────────────────────────────────────────

    /// Queue `render(schema)` for every session `wants`. Rendering happens
    /// once per distinct schema version.
    fn fan_out(
        &self,
        wants: impl Fn(&Session) -> bool,
        render: impl Fn(u32) -> Option<Value>,
    ) -> u64 {
        let _gate = self.fanout.lock();
        let mut frames: HashMap<u32, Option<Arc<String>>> = HashMap::new();
        let mut delivered = 0;
        for entry in &self.sessions {
            let session = entry.value();
            if session.is_closed() || !wants(session) {
                continue;
            }
            let schema = session.schema_version();
            let frame = frames
                .entry(schema)
                .or_insert_with(|| encode_event(render(schema)?));
            if let Some(text) = frame {
                if session.try_send_event(Arc::clone(text)) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Deliver a driver event to every listening session whose snapshot
    /// predates it.
    pub fn fan_out_event(&self, sequenced: &SequencedEvent) -> u64 {
        let event = &sequenced.event;
        let delivered = self.fan_out(
            |s| s.wants_event(sequenced.seq),
            |schema| render_event(event, schema),
        );
        counter!("events_forwarded_total", "source" => event.source()).increment(delivered);
        delivered
    }

    /// Deliver a schema-independent event to every listening session.
    pub fn broadcast_event(&self, event: &Value) -> u64 {
        self.fan_out(Session::receives_events, |_| Some(event.clone()))
    }

    /// Deliver a log line to every session whose filter passes it.
    pub fn fan_out_log(&self, entry: &LogEntry) -> u64 {
        let rendered = render_log(entry);
        let node_id = entry.context.node_id;
        self.fan_out(|s| s.wants_log_for(node_id), |_| Some(rendered.clone()))
    }

    /// Send a decision request to `origin` if it is still listening,
    /// otherwise to every listening session.
    pub fn send_decision_event(&self, origin: &SessionId, event: Value) {
        if let Some(session) = self.get(origin) {
            if session.receives_events() && !session.is_closed() {
                let delivered = self.fan_out(|s| s.id == *origin, |_| Some(event.clone()));
                if delivered > 0 {
                    return;
                }
            }
        }
        debug!(%origin, "originating session unavailable, broadcasting decision request");
        let _ = self.broadcast_event(&event);
    }

    // ── forwarders ──────────────────────────────────────────────────

    /// Idempotent.
    fn ensure_event_forwarder(&self) {
        let mut slot = self.event_forwarder.lock();
        if slot.as_ref().is_some_and(ForwarderHandle::is_running) {
            return;
        }
        let cancel = CancellationToken::new();
        let task = spawn_event_forwarder(self.this.clone(), self.driver.subscribe(), cancel.clone());
        info!("event forwarder started");
        *slot = Some(ForwarderHandle { cancel, task });
    }

    pub fn event_forwarder_running(&self) -> bool {
        self.event_forwarder
            .lock()
            .as_ref()
            .is_some_and(ForwarderHandle::is_running)
    }

    /// Opt a session into log lines. Starts the log forwarder if needed.
    pub fn subscribe_logs(&self, session: &Session, filter: Option<LogFilter>) {
        let _ = session.set_receive_logs(true, filter);
        self.ensure_log_forwarder();
    }

    /// Opt a session out of log lines. The forwarder stops with the last
    /// interested session.
    pub fn unsubscribe_logs(&self, session: &Session) {
        if session.set_receive_logs(false, None) {
            self.release_log_forwarder_if_idle();
        }
    }

    /// Re-subscribe so the forwarder sees a changed driver log config.
    pub fn restart_log_forwarder(&self) {
        let mut slot = self.log_forwarder.lock();
        if let Some(handle) = slot.take() {
            handle.stop();
            *slot = Some(self.spawn_log_forwarder());
            debug!("log forwarder restarted");
        }
    }

    pub fn log_forwarder_running(&self) -> bool {
        self.log_forwarder
            .lock()
            .as_ref()
            .is_some_and(ForwarderHandle::is_running)
    }

    fn ensure_log_forwarder(&self) {
        let mut slot = self.log_forwarder.lock();
        if slot.as_ref().is_some_and(ForwarderHandle::is_running) {
            return;
        }
        *slot = Some(self.spawn_log_forwarder());
        info!("log forwarder started");
    }

    fn spawn_log_forwarder(&self) -> ForwarderHandle {
        let cancel = CancellationToken::new();
        let task = spawn_log_forwarder(self.this.clone(), self.driver.subscribe_logs(), cancel.clone());
        ForwarderHandle { cancel, task }
    }

    fn release_log_forwarder_if_idle(&self) {
        let mut slot = self.log_forwarder.lock();
        if self.sessions.iter().any(|s| s.receives_logs()) {
            return;
        }
        if let Some(handle) = slot.take() {
            handle.stop();
            info!("log forwarder stopped, no session wants logs");
        }
    }

    // ── liveness ────────────────────────────────────────────────────

    /// Probe every session. Sessions still owing an answer from the last
    /// tick are removed and closed. Returns how many were disconnected.
    pub fn heartbeat_tick(&self) -> usize {
        let unresponsive: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| s.probe() == Probe::Unresponsive)
            .map(|s| s.id.clone())
            .collect();

        let mut disconnected = 0;
        for id in unresponsive {
            if self.unregister(&id) {
                warn!(session_id = %id, "no answer to previous ping, disconnecting");
                counter!("heartbeat_disconnects_total").increment(1);
                disconnected += 1;
            }
        }
        disconnected
    }

    // ── decisions ───────────────────────────────────────────────────

    /// Callbacks for an inclusion started by `origin`.
    pub fn inclusion_broker(&self, origin: &SessionId) -> Arc<InclusionBroker> {
        Arc::new(InclusionBroker::new(
            self.this.clone(),
            origin.clone(),
            self.decisions.next_owner(),
        ))
    }

    // ── lifecycle ───────────────────────────────────────────────────

    /// Stop both forwarders, discard pending decisions and close every
    /// session.
    pub fn shutdown(&self) {
        if let Some(handle) = self.event_forwarder.lock().take() {
            handle.stop();
        }
        if let Some(handle) = self.log_forwarder.lock().take() {
            handle.stop();
        }
        let discarded = self.decisions.cancel_all();
        let ids: Vec<SessionId> = self.sessions.iter().map(|s| s.id.clone()).collect();
        for id in &ids {
            let _ = self.unregister(id);
        }
        info!(sessions = ids.len(), discarded, "session registry shut down");
    }
}

fn encode_event(event: Value) -> Option<Arc<String>> {
    match (OutgoingMessage::Event { event }).to_text() {
        Ok(text) => Some(text),
        Err(error) => {
            warn!(%error, "failed to encode event");
            None
        }
    }
}
