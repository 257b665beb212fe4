//! Periodic ping/pong liveness sweep over all sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::registry::SessionRegistry;

/// Probe every session each `interval` until `cancel` fires.
///
/// A session that has not answered the previous probe by the next tick is
/// disconnected. Returns the total number of sessions disconnected.
pub async fn run_heartbeat(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> usize {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    let mut disconnected = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let dropped = registry.heartbeat_tick();
                if dropped > 0 {
                    debug!(dropped, remaining = registry.session_count(), "heartbeat sweep");
                }
                disconnected += dropped;
            }
            () = cancel.cancelled() => return disconnected,
        }
    }
}
