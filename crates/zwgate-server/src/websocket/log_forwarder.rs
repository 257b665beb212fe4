//! Forwards driver log lines to sessions that asked for them.
//!
//! The registry starts this task when the first session subscribes and
//! stops it when the last one leaves. A log config change replaces the
//! task with a fresh subscription.

use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zwgate_core::logging::LogEntry;

use crate::registry::SessionRegistry;

pub(crate) fn spawn_log_forwarder(
    registry: Weak<SessionRegistry>,
    mut logs: broadcast::Receiver<LogEntry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = logs.recv() => received,
            };
            match received {
                Ok(entry) => {
                    let Some(registry) = registry.upgrade() else {
                        break;
                    };
                    let _ = registry.fan_out_log(&entry);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "log forwarder lagged, lines dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("log forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tokio::sync::mpsc;
    use zwgate_core::logging::LogLevel;
    use zwgate_core::sim::SimulatedDriver;
    use zwgate_core::Driver;

    use crate::ids::SessionId;
    use crate::registry::RegistryConfig;
    use crate::websocket::session::{Outbound, Session};

    #[tokio::test]
    async fn delivers_driver_log_lines() {
        let driver = Arc::new(SimulatedDriver::new(0));
        let registry = SessionRegistry::new(driver.clone(), RegistryConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(SessionId::new(), 0, tx));
        registry.register(Arc::clone(&session));
        registry.subscribe_logs(&session, None);
        tokio::task::yield_now().await;

        driver.log(LogEntry::new(LogLevel::Warn, "DRIVER", "radio busy"));
        let Some(Outbound::Text(text)) = rx.recv().await else {
            panic!("expected a log frame");
        };
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["event"]["event"], "logging");
        assert_eq!(frame["event"]["message"], "radio busy");
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let driver = Arc::new(SimulatedDriver::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_log_forwarder(Weak::new(), driver.subscribe_logs(), cancel.clone());
        cancel.cancel();
        task.await.unwrap();
    }
}
