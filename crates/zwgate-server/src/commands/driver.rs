//! `driver.*` commands.

use async_trait::async_trait;
use serde_json::json;

use super::{CommandContext, CommandHandler, Reply};
use crate::protocol::incoming::DriverCommand;
use crate::protocol::CommandError;
use crate::state::dump_driver;

pub struct DriverHandler;

#[async_trait]
impl CommandHandler<DriverCommand> for DriverHandler {
    async fn handle(&self, command: DriverCommand, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let driver = ctx.registry.driver();
        let result = match command {
            DriverCommand::GetConfig => json!({ "config": dump_driver(&driver.state()) }),
            DriverCommand::EnableStatistics {
                application_name,
                application_version,
            } => {
                driver
                    .enable_statistics(&application_name, &application_version)
                    .await?;
                json!({})
            }
            DriverCommand::DisableStatistics => {
                driver.disable_statistics().await?;
                json!({})
            }
            DriverCommand::IsStatisticsEnabled => {
                json!({ "statisticsEnabled": driver.is_statistics_enabled() })
            }
        };
        Ok(Reply::Result(result))
    }
}
