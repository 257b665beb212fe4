//! WebSocket sessions, the per-connection loop, forwarders and heartbeat.

pub mod connection;
pub mod event_forwarder;
pub mod heartbeat;
pub mod log_forwarder;
pub mod session;
