//! `node.*` commands.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{require_node, CommandContext, CommandHandler, Reply};
use crate::protocol::incoming::NodeCommand;
use crate::protocol::CommandError;
use crate::state::{default_metadata, dump_endpoint, dump_node};

pub struct NodeHandler;

#[async_trait]
impl CommandHandler<NodeCommand> for NodeHandler {
    async fn handle(&self, command: NodeCommand, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let driver = ctx.registry.driver();
        let result = match command {
            NodeCommand::GetState { node_id } => {
                let node = require_node(ctx, node_id)?;
                json!({ "state": dump_node(&node, ctx.schema()) })
            }
            NodeCommand::SetValue {
                node_id,
                value_id,
                value,
                options,
            } => {
                let _ = require_node(ctx, node_id)?;
                if options.is_some() {
                    debug!(node_id, %value_id, "set_value options are not forwarded");
                }
                let success = driver.set_value(node_id, &value_id, value).await?;
                json!({ "success": success })
            }
            NodeCommand::GetValue { node_id, value_id } => {
                let node = require_node(ctx, node_id)?;
                let value = node.value(&value_id).and_then(|v| v.value.clone());
                json!({ "value": value })
            }
            NodeCommand::GetDefinedValueIds { node_id } => {
                let node = require_node(ctx, node_id)?;
                let ids: Vec<_> = node.values.iter().map(|v| &v.id).collect();
                json!({ "valueIds": ids })
            }
            NodeCommand::GetValueMetadata { node_id, value_id } => {
                let node = require_node(ctx, node_id)?;
                let metadata = node
                    .value(&value_id)
                    .map_or_else(default_metadata, |v| v.metadata.clone());
                json!(metadata)
            }
            NodeCommand::RefreshInfo { node_id } => {
                let _ = require_node(ctx, node_id)?;
                driver.refresh_info(node_id).await?;
                json!({})
            }
            NodeCommand::Ping { node_id } => {
                let _ = require_node(ctx, node_id)?;
                json!({ "responded": driver.ping(node_id).await? })
            }
            NodeCommand::SetName { node_id, name } => {
                let _ = require_node(ctx, node_id)?;
                driver.set_name(node_id, name)?;
                json!({})
            }
            NodeCommand::SetLocation { node_id, location } => {
                let _ = require_node(ctx, node_id)?;
                driver.set_location(node_id, location)?;
                json!({})
            }
            NodeCommand::GetEndpoint { node_id, endpoint } => {
                let node = require_node(ctx, node_id)?;
                let state = node
                    .endpoint(endpoint)
                    .ok_or(CommandError::EndpointNotFound { node_id, endpoint })?;
                json!({ "endpoint": dump_endpoint(&state, ctx.schema()) })
            }
        };
        Ok(Reply::Result(result))
    }
}
