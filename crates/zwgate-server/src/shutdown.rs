//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// How long background tasks get to finish before they are left behind.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener, heartbeat and
/// session registry.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 1. Cancel the token (listener and heartbeat stop)
    /// 2. Shut the registry down: forwarders stop, pending decisions are
    ///    discarded, every session is closed
    /// 3. Wait up to `timeout` for `handles`
    pub async fn graceful_shutdown(
        &self,
        registry: &SessionRegistry,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        registry.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use zwgate_core::sim::SimulatedDriver;

    use super::*;
    use crate::ids::SessionId;
    use crate::registry::RegistryConfig;
    use crate::websocket::session::Session;

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(Arc::new(SimulatedDriver::new(1)), RegistryConfig::default())
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_sessions() {
        let coord = ShutdownCoordinator::new();
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        let session = Arc::new(Session::new(SessionId::new(), 0, tx));
        registry.register(Arc::clone(&session));

        let token = coord.token();
        let handle = tokio::spawn(async move { token.cancelled().await });

        coord.graceful_shutdown(&registry, vec![handle], None).await;
        assert!(session.is_closed());
        assert_eq!(registry.session_count(), 0);
        assert!(!registry.event_forwarder_running());
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        coord
            .graceful_shutdown(&registry(), vec![handle], Some(Duration::from_millis(50)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
