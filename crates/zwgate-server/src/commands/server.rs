//! Session-level commands: handshake, event subscription, driver logs.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{CommandContext, CommandHandler, Reply};
use crate::protocol::incoming::ServerCommand;
use crate::protocol::CommandError;
use crate::registry::ListenError;

pub struct ServerHandler;

#[async_trait]
impl CommandHandler<ServerCommand> for ServerHandler {
    async fn handle(&self, command: ServerCommand, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let registry = &ctx.registry;
        let session = &ctx.session;
        match command {
            ServerCommand::Initialize {
                schema_version,
                additional_user_agent_components,
            } => {
                registry.negotiate_schema(session, schema_version)?;
                if let Some(components) = &additional_user_agent_components {
                    debug!(session_id = %session.id, ?components, "client user agent");
                }
                session.set_user_agent(additional_user_agent_components);
                Ok(Reply::Result(json!({})))
            }
            ServerCommand::SetApiSchema { schema_version } => {
                registry.negotiate_schema(session, schema_version)?;
                Ok(Reply::Result(json!({})))
            }
            ServerCommand::StartListening => {
                match registry.start_listening(session, &ctx.message_id) {
                    Ok(()) => Ok(Reply::Sent),
                    Err(ListenError::QueueFull) => {
                        warn!(session_id = %session.id, "no room for initial state, closing session");
                        session.close();
                        Ok(Reply::Sent)
                    }
                    Err(ListenError::Encode(e)) => Err(CommandError::Internal(format!(
                        "failed to encode state: {e}"
                    ))),
                }
            }
            ServerCommand::UpdateLogConfig { config } => {
                let _ = registry.driver().update_log_config(&config);
                registry.restart_log_forwarder();
                Ok(Reply::Result(json!({})))
            }
            ServerCommand::GetLogConfig => {
                Ok(Reply::Result(json!({ "config": registry.driver().log_config() })))
            }
            ServerCommand::StartListeningLogs { filter } => {
                registry.subscribe_logs(session, filter);
                Ok(Reply::Result(json!({})))
            }
            ServerCommand::StopListeningLogs => {
                registry.unsubscribe_logs(session);
                Ok(Reply::Result(json!({})))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::commands::test_support::Harness;
    use crate::protocol::incoming::LogFilter;

    async fn run(h: &Harness, command: ServerCommand) -> Result<Reply, CommandError> {
        ServerHandler.handle(command, &h.ctx("1")).await
    }

    #[tokio::test]
    async fn initialize_stores_schema_and_user_agent() {
        let h = Harness::new(0);
        let components = BTreeMap::from([("myApp".to_owned(), "1.2.3".to_owned())]);
        let reply = run(
            &h,
            ServerCommand::Initialize {
                schema_version: 14,
                additional_user_agent_components: Some(components.clone()),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, Reply::Result(json!({})));
        assert_eq!(h.session.schema_version(), 14);
        assert_eq!(h.session.user_agent(), Some(components));
    }

    #[tokio::test]
    async fn out_of_range_schema_is_rejected_and_kept() {
        let h = Harness::new(5);
        let err = run(&h, ServerCommand::SetApiSchema { schema_version: 99 })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::SchemaIncompatible { requested: 99, .. }));
        assert_eq!(h.session.schema_version(), 5);

        let err = run(&h, ServerCommand::SetApiSchema { schema_version: -1 })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::SchemaIncompatible { .. }));
        assert_eq!(h.session.schema_version(), 5);
    }

    #[tokio::test]
    async fn start_listening_sends_its_own_reply() {
        let mut h = Harness::new(1);
        let reply = run(&h, ServerCommand::StartListening).await.unwrap();
        assert_eq!(reply, Reply::Sent);
        assert!(h.session.receives_events());

        let frame = h.next_json();
        assert_eq!(frame["messageId"], "1");
        assert_eq!(frame["success"], true);
        assert!(frame["result"]["state"]["driver"].is_object());
    }

    #[tokio::test]
    async fn log_config_round_trip() {
        let h = Harness::new(33);
        let update = serde_json::from_value(json!({"level": "debug"})).unwrap();
        let _ = run(&h, ServerCommand::UpdateLogConfig { config: update })
            .await
            .unwrap();
        let Reply::Result(result) = run(&h, ServerCommand::GetLogConfig).await.unwrap() else {
            panic!("expected a result");
        };
        assert_eq!(result["config"]["level"], "debug");
    }

    #[tokio::test]
    async fn log_subscription_toggles_forwarder() {
        let h = Harness::new(33);
        let _ = run(
            &h,
            ServerCommand::StartListeningLogs {
                filter: Some(LogFilter { node_id: Some(2) }),
            },
        )
        .await
        .unwrap();
        assert!(h.session.receives_logs());
        assert!(h.registry.log_forwarder_running());

        let _ = run(&h, ServerCommand::StopListeningLogs).await.unwrap();
        assert!(!h.session.receives_logs());
        assert!(!h.registry.log_forwarder_running());
    }
}
