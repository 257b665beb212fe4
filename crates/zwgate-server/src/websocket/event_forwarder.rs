//! Bridges the driver's event channel to the sessions.

use std::sync::Weak;

use metrics::counter;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zwgate_core::SequencedEvent;

use crate::registry::SessionRegistry;

/// Forward every driver event to the registry until cancelled, the driver
/// closes its channel, or the registry is dropped.
///
/// One task handles every event in emission order, so each session sees
/// events in the order the driver produced them.
pub(crate) fn spawn_event_forwarder(
    registry: Weak<SessionRegistry>,
    mut events: broadcast::Receiver<SequencedEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => received,
            };
            match received {
                Ok(sequenced) => {
                    let Some(registry) = registry.upgrade() else {
                        break;
                    };
                    let delivered = registry.fan_out_event(&sequenced);
                    debug!(
                        seq = sequenced.seq,
                        event = sequenced.event.name(),
                        source = sequenced.event.source(),
                        delivered,
                        "event forwarded"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event forwarder lagged behind the driver");
                    counter!("events_dropped_total", "reason" => "lagged").increment(skipped);
                }
                Err(RecvError::Closed) => {
                    info!("driver event channel closed");
                    break;
                }
            }
        }
        debug!("event forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tokio::sync::mpsc;
    use zwgate_core::events::NodeEvent;
    use zwgate_core::sim::SimulatedDriver;
    use zwgate_core::{Driver, DriverEvent};

    use crate::ids::SessionId;
    use crate::registry::RegistryConfig;
    use crate::websocket::session::{Outbound, Session};

    #[tokio::test]
    async fn forwards_in_emission_order() {
        let driver = Arc::new(SimulatedDriver::new(2));
        let registry = SessionRegistry::new(driver.clone(), RegistryConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(SessionId::new(), 33, tx));
        registry.register(Arc::clone(&session));
        registry.start_listening(&session, "1").unwrap();
        let _state = rx.recv().await;

        driver.emit(DriverEvent::node(2, NodeEvent::Sleep));
        driver.emit(DriverEvent::node(2, NodeEvent::Wakeup));

        let mut names = Vec::new();
        for _ in 0..2 {
            let Some(Outbound::Text(text)) = rx.recv().await else {
                panic!("expected an event frame");
            };
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            names.push(frame["event"]["event"].as_str().unwrap().to_owned());
        }
        assert_eq!(names, ["sleep", "wake up"]);
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let driver = Arc::new(SimulatedDriver::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_event_forwarder(Weak::new(), driver.subscribe(), cancel.clone());
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_registry_is_gone() {
        let driver = Arc::new(SimulatedDriver::new(0));
        let task =
            spawn_event_forwarder(Weak::new(), driver.subscribe(), CancellationToken::new());
        driver.emit(DriverEvent::AllNodesReady);
        task.await.unwrap();
    }
}
