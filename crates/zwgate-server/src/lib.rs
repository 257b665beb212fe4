//! # zwgate-server
//!
//! The session/protocol engine of the gateway.
//!
//! - [`protocol`]: wire messages, command parsing and error encoding
//! - [`state`]: schema-versioned state snapshots
//! - [`events`]: schema-versioned event and log rendering
//! - [`registry::SessionRegistry`]: sessions, fan-out, forwarders, decisions
//! - [`commands`]: per-namespace command handlers
//! - [`server::GatewayServer`]: axum routes (`/ws`, `/health`, `/metrics`)

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod decision;
pub mod events;
pub mod health;
pub mod ids;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use registry::{RegistryConfig, SessionRegistry};
pub use server::{GatewayServer, ServerError, ServerHandle};
