//! `controller.*` commands, including the answers to inclusion decisions.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{CommandContext, CommandHandler, Reply};
use crate::decision::DecisionError;
use crate::protocol::incoming::ControllerCommand;
use crate::protocol::CommandError;
use crate::state::dump_controller;

pub struct ControllerHandler;

#[async_trait]
impl CommandHandler<ControllerCommand> for ControllerHandler {
    async fn handle(
        &self,
        command: ControllerCommand,
        ctx: &CommandContext,
    ) -> Result<Reply, CommandError> {
        let registry = &ctx.registry;
        let driver = registry.driver();
        let result = match command {
            ControllerCommand::BeginInclusion { options } => {
                let broker = registry.inclusion_broker(&ctx.session.id);
                let success = driver
                    .begin_inclusion(options.unwrap_or_default(), broker)
                    .await?;
                info!(session_id = %ctx.session.id, success, "inclusion requested");
                json!({ "success": success })
            }
            ControllerCommand::StopInclusion => json!({ "success": driver.stop_inclusion().await? }),
            ControllerCommand::BeginExclusion => json!({ "success": driver.begin_exclusion().await? }),
            ControllerCommand::StopExclusion => json!({ "success": driver.stop_exclusion().await? }),
            ControllerCommand::GrantSecurityClasses { inclusion_grant } => {
                registry
                    .decisions()
                    .grant
                    .resolve(inclusion_grant)
                    .map_err(not_pending)?;
                json!({})
            }
            ControllerCommand::ValidateDskAndEnterPin { pin } => {
                registry
                    .decisions()
                    .dsk_pin
                    .resolve(pin)
                    .map_err(not_pending)?;
                json!({})
            }
            ControllerCommand::BeginHealingNetwork => {
                json!({ "success": driver.begin_healing_network().await? })
            }
            ControllerCommand::StopHealingNetwork => {
                json!({ "success": driver.stop_healing_network().await? })
            }
            ControllerCommand::RemoveFailedNode { node_id } => {
                driver.remove_failed_node(node_id).await?;
                json!({})
            }
            ControllerCommand::GetState => {
                json!({ "state": dump_controller(&driver.state().controller, ctx.schema()) })
            }
        };
        Ok(Reply::Result(result))
    }
}

fn not_pending(error: DecisionError) -> CommandError {
    match error {
        DecisionError::Busy(kind) | DecisionError::NotPending(kind) => {
            CommandError::InclusionPhaseNotInProgress(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use zwgate_core::model::{
        InclusionGrant, InclusionOptions, InclusionState, InclusionStrategy, SecurityClass,
    };
    use zwgate_core::sim::SIM_DSK_PIN;
    use zwgate_core::Driver;

    use super::*;
    use crate::commands::test_support::Harness;
    use crate::decision::{DecisionKind, DecisionSlot};
    use crate::protocol::ErrorCode;

    async fn run(h: &Harness, command: ControllerCommand) -> Result<Reply, CommandError> {
        ControllerHandler.handle(command, &h.ctx("1")).await
    }

    async fn wait_pending<T>(slot: &DecisionSlot<T>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !slot.is_pending() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("decision never requested");
    }

    fn s2() -> Option<InclusionOptions> {
        Some(InclusionOptions {
            strategy: InclusionStrategy::SecurityS2,
            force_security: None,
        })
    }

    #[tokio::test]
    async fn answers_without_pending_decision_fail() {
        let h = Harness::new(33);
        let err = run(&h, ControllerCommand::ValidateDskAndEnterPin { pin: "12345".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InclusionPhaseNotInProgress);
        assert!(matches!(
            err,
            CommandError::InclusionPhaseNotInProgress(DecisionKind::ValidateDskAndEnterPin)
        ));
    }

    #[tokio::test]
    async fn secure_inclusion_completes_through_decisions() {
        let h = Harness::new(33);
        let before = h.driver.state().nodes.len();

        let reply = run(&h, ControllerCommand::BeginInclusion { options: s2() })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Result(json!({"success": true})));

        wait_pending(&h.registry.decisions().grant).await;
        let grant = InclusionGrant {
            security_classes: vec![SecurityClass::S2Authenticated],
            client_side_auth: false,
        };
        let _ = run(&h, ControllerCommand::GrantSecurityClasses { inclusion_grant: grant })
            .await
            .unwrap();

        wait_pending(&h.registry.decisions().dsk_pin).await;
        let _ = run(
            &h,
            ControllerCommand::ValidateDskAndEnterPin {
                pin: SIM_DSK_PIN.into(),
            },
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.driver.state().nodes.len() == before {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("node never added");
        assert!(!h.registry.decisions().dsk_pin.is_pending());
    }

    #[tokio::test]
    async fn overlapping_secure_inclusion_keeps_first_decision() {
        let h = Harness::new(33);
        let _ = run(&h, ControllerCommand::BeginInclusion { options: s2() })
            .await
            .unwrap();
        wait_pending(&h.registry.decisions().grant).await;
        let _ = run(&h, ControllerCommand::StopInclusion).await.unwrap();

        let reply = run(&h, ControllerCommand::BeginInclusion { options: s2() })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Result(json!({"success": true})));
        tokio::time::timeout(Duration::from_secs(2), async {
            while h.driver.state().controller.inclusion_state != InclusionState::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second flow never gave up");
        assert!(h.registry.decisions().grant.is_pending());

        let before = h.driver.state().nodes.len();
        let grant = InclusionGrant {
            security_classes: vec![SecurityClass::S2Unauthenticated],
            client_side_auth: false,
        };
        let _ = run(&h, ControllerCommand::GrantSecurityClasses { inclusion_grant: grant })
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while h.driver.state().nodes.len() == before {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first flow never finished");
    }

    #[tokio::test]
    async fn second_begin_inclusion_reports_failure() {
        let h = Harness::new(33);
        let _ = run(&h, ControllerCommand::BeginInclusion { options: None })
            .await
            .unwrap();
        let reply = run(&h, ControllerCommand::BeginInclusion { options: None })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Result(json!({"success": false})));
        assert_eq!(
            run(&h, ControllerCommand::StopInclusion).await.unwrap(),
            Reply::Result(json!({"success": true}))
        );
    }

    #[tokio::test]
    async fn get_state_uses_session_schema() {
        let h = Harness::new(30);
        let Reply::Result(result) = run(&h, ControllerCommand::GetState).await.unwrap() else {
            panic!("expected a result");
        };
        assert!(result["state"].get("isHealNetworkActive").is_some());
        assert!(result["state"].get("isRebuildingRoutes").is_none());
    }

    #[tokio::test]
    async fn remove_failed_node_on_live_node_is_a_zwave_error() {
        let h = Harness::new(33);
        let err = run(&h, ControllerCommand::RemoveFailedNode { node_id: 2 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ZwaveError);
    }
}
