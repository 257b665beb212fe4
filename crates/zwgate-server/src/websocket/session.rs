//! Per-connection protocol state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zwgate_core::model::NodeId;

use crate::ids::SessionId;
use crate::protocol::incoming::LogFilter;

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Arc<String>),
    Ping,
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// A ping was queued; the peer must answer before the next probe.
    Sent,
    /// The previous ping is still unanswered.
    Unresponsive,
}

/// One connected client.
///
/// Everything the registry and the forwarders need to read or flip lives
/// here behind atomics, so fan-out never waits on a connection task.
pub struct Session {
    pub id: SessionId,
    pub connected_at: Instant,
    schema_version: AtomicU32,
    receive_events: AtomicBool,
    /// Driver events at or below this position are already in the
    /// session's state snapshot.
    event_floor: AtomicU64,
    receive_logs: AtomicBool,
    log_filter: Mutex<Option<LogFilter>>,
    user_agent: Mutex<Option<BTreeMap<String, String>>>,
    outstanding_ping: AtomicBool,
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    dropped_events: AtomicU64,
}

impl Session {
    pub fn new(id: SessionId, initial_schema: u32, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            schema_version: AtomicU32::new(initial_schema),
            receive_events: AtomicBool::new(false),
            event_floor: AtomicU64::new(0),
            receive_logs: AtomicBool::new(false),
            log_filter: Mutex::new(None),
            user_agent: Mutex::new(None),
            outstanding_ping: AtomicBool::new(false),
            tx,
            closed: CancellationToken::new(),
            dropped_events: AtomicU64::new(0),
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::Acquire)
    }

    pub(crate) fn set_schema_version(&self, version: u32) {
        self.schema_version.store(version, Ordering::Release);
    }

    pub fn receives_events(&self) -> bool {
        self.receive_events.load(Ordering::Acquire)
    }

    /// Start receiving driver events positioned after `snapshot_seq`.
    pub(crate) fn enable_events_after(&self, snapshot_seq: u64) {
        self.event_floor.store(snapshot_seq, Ordering::Release);
        self.receive_events.store(true, Ordering::Release);
    }

    /// Whether the driver event at `seq` is news to this session.
    pub fn wants_event(&self, seq: u64) -> bool {
        self.receives_events() && seq > self.event_floor.load(Ordering::Acquire)
    }

    pub fn receives_logs(&self) -> bool {
        self.receive_logs.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub(crate) fn set_receive_logs(&self, enabled: bool, filter: Option<LogFilter>) -> bool {
        *self.log_filter.lock() = filter;
        self.receive_logs.swap(enabled, Ordering::AcqRel)
    }

    /// Whether a log line about `node_id` passes this session's filter.
    pub fn wants_log_for(&self, node_id: Option<NodeId>) -> bool {
        self.receives_logs()
            && self
                .log_filter
                .lock()
                .as_ref()
                .map_or(true, |f| f.matches(node_id))
    }

    pub fn set_user_agent(&self, components: Option<BTreeMap<String, String>>) {
        *self.user_agent.lock() = components;
    }

    pub fn user_agent(&self) -> Option<BTreeMap<String, String>> {
        self.user_agent.lock().clone()
    }

    /// Queue an event frame. A full queue drops the event.
    ///
    /// Returns `false` when the frame was not queued.
    pub fn try_send_event(&self, text: Arc<String>) -> bool {
        match self.tx.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(session_id = %self.id, dropped, "outbound queue full, dropping event");
                metrics::counter!("events_dropped_total", "reason" => "queue_full").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a frame without waiting. Used where a reply must be ordered
    /// with respect to events queued under the same lock.
    pub fn try_send_reply(&self, text: Arc<String>) -> bool {
        self.tx.try_send(Outbound::Text(text)).is_ok()
    }

    /// Queue a reply, waiting for room. Returns `false` once the
    /// connection is gone.
    pub async fn send_reply(&self, text: Arc<String>) -> bool {
        tokio::select! {
            sent = self.tx.send(Outbound::Text(text)) => sent.is_ok(),
            () = self.closed.cancelled() => false,
        }
    }

    /// Start a liveness probe.
    pub fn probe(&self) -> Probe {
        if self.outstanding_ping.swap(true, Ordering::AcqRel) {
            return Probe::Unresponsive;
        }
        // A full queue means the peer is not reading; the next tick decides.
        let _ = self.tx.try_send(Outbound::Ping);
        Probe::Sent
    }

    /// Any inbound frame counts as a probe answer.
    pub fn mark_alive(&self) {
        self.outstanding_ping.store(false, Ordering::Release);
    }

    pub fn has_outstanding_ping(&self) -> bool {
        self.outstanding_ping.load(Ordering::Acquire)
    }

    /// Ask the connection task to close. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
