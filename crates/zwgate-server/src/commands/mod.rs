//! Command dispatch.
//!
//! Each namespace has one handler implementing [`CommandHandler`] for its
//! closed command enum. [`CommandRegistry::execute`] runs a parsed request,
//! records metrics and queues exactly one reply.

pub mod controller;
pub mod driver;
pub mod node;
pub mod server;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::protocol::incoming::{
    Command, ControllerCommand, DriverCommand, NodeCommand, ServerCommand,
};
use crate::protocol::outgoing::{OutgoingMessage, ResultMessage};
use crate::protocol::CommandError;
use crate::registry::SessionRegistry;
use crate::websocket::session::Session;

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Wrap in a success `result`.
    Result(Value),
    /// The handler already queued its own reply.
    Sent,
}

/// Everything a handler may touch for one request.
pub struct CommandContext {
    pub registry: Arc<SessionRegistry>,
    pub session: Arc<Session>,
    pub message_id: String,
}

impl CommandContext {
    /// Schema version the reply is shaped for.
    pub fn schema(&self) -> u32 {
        self.session.schema_version()
    }
}

#[async_trait]
pub trait CommandHandler<C>: Send + Sync {
    async fn handle(&self, command: C, ctx: &CommandContext) -> Result<Reply, CommandError>;
}

pub struct CommandRegistry {
    server: Arc<dyn CommandHandler<ServerCommand>>,
    driver: Arc<dyn CommandHandler<DriverCommand>>,
    controller: Arc<dyn CommandHandler<ControllerCommand>>,
    node: Arc<dyn CommandHandler<NodeCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            server: Arc::new(server::ServerHandler),
            driver: Arc::new(driver::DriverHandler),
            controller: Arc::new(controller::ControllerHandler),
            node: Arc::new(node::NodeHandler),
        }
    }

    pub async fn dispatch(&self, command: Command, ctx: &CommandContext) -> Result<Reply, CommandError> {
        match command {
            Command::Server(c) => self.server.handle(c, ctx).await,
            Command::Driver(c) => self.driver.handle(c, ctx).await,
            Command::Controller(c) => self.controller.handle(c, ctx).await,
            Command::Node(c) => self.node.handle(c, ctx).await,
        }
    }

    /// Run one request and queue its reply on the session.
    ///
    /// A reply for a session that has gone away is discarded.
    #[instrument(skip_all, fields(
        session_id = %ctx.session.id,
        message_id = %ctx.message_id,
        command = command_name,
    ))]
    pub async fn execute(
        &self,
        ctx: CommandContext,
        command_name: &str,
        command: Result<Command, CommandError>,
    ) {
        let namespace = command.as_ref().map_or("unknown", Command::namespace);
        counter!("commands_total", "namespace" => namespace).increment(1);
        let start = Instant::now();

        let outcome = match command {
            Ok(command) => self.dispatch(command, &ctx).await,
            Err(error) => Err(error),
        };

        let duration = start.elapsed();
        histogram!("command_duration_seconds", "namespace" => namespace)
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(duration_secs = duration.as_secs_f64(), "slow command");
        }

        let reply = match outcome {
            Ok(Reply::Sent) => return,
            Ok(Reply::Result(result)) => ResultMessage::success(ctx.message_id.as_str(), result),
            Err(error) => {
                let code = error.code().as_str();
                counter!("command_errors_total", "namespace" => namespace, "error_code" => code)
                    .increment(1);
                debug!(error_code = code, %error, "command failed");
                ResultMessage::failure(ctx.message_id.as_str(), &error, ctx.schema())
            }
        };

        match OutgoingMessage::from(reply).to_text() {
            Ok(text) => {
                if !ctx.session.send_reply(text).await {
                    debug!("session gone, reply discarded");
                }
            }
            Err(error) => warn!(%error, "failed to encode reply"),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a node or fail with `NodeNotFound`.
pub(crate) fn require_node(
    ctx: &CommandContext,
    node_id: zwgate_core::model::NodeId,
) -> Result<zwgate_core::model::NodeState, CommandError> {
    ctx.registry
        .driver()
        .node(node_id)
        .ok_or(CommandError::NodeNotFound(node_id))
}
