//! One WebSocket connection from upgrade to disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::session::{Outbound, Session};
use crate::commands::{CommandContext, CommandRegistry};
use crate::ids::SessionId;
use crate::protocol::incoming::{parse_frame, Command, IncomingMessage};
use crate::registry::SessionRegistry;

/// How long the writer may take to flush queued frames after the reader
/// has finished.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a client connection.
///
/// 1. Queues the `version` banner before anything else
/// 2. Registers the session so heartbeat and fan-out can see it
/// 3. Answers server commands in arrival order; other commands run
///    concurrently and may reply out of order
/// 4. Closes without a reply on a frame that is not a request
/// 5. Unregisters on disconnect; in-flight driver calls keep running and
///    their replies are discarded
#[instrument(skip_all, fields(session_id = %id))]
pub async fn run_connection(
    ws: WebSocket,
    id: SessionId,
    registry: Arc<SessionRegistry>,
    commands: Arc<CommandRegistry>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let config = registry.config().clone();
    let (tx, mut rx) = mpsc::channel::<Outbound>(config.outbound_queue_capacity);
    let session = Arc::new(Session::new(id, config.min_schema_version, tx));

    match registry.version_message().to_text() {
        Ok(banner) => {
            let _ = session.try_send_reply(banner);
        }
        Err(error) => {
            warn!(%error, "failed to encode version banner");
            return;
        }
    }

    let started = Instant::now();
    registry.register(Arc::clone(&session));
    counter!("ws_connections_total").increment(1);
    info!("client connected");

    let closed = session.closed_token();
    let mut outbound = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = rx.recv() => {
                    let message = match frame {
                        Some(Outbound::Text(text)) => Message::Text(Arc::unwrap_or_clone(text).into()),
                        Some(Outbound::Ping) => Message::Ping(vec![].into()),
                        None => break,
                    };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                () = closed.cancelled() => break,
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let closed = session.closed_token();
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = closed.cancelled() => {
                debug!("session closed by server");
                break;
            }
        };
        let Some(Ok(message)) = frame else {
            break;
        };
        session.mark_alive();

        let parsed = match &message {
            Message::Text(text) => parse_frame(text.as_str()),
            Message::Binary(data) => {
                let Ok(text) = std::str::from_utf8(data) else {
                    warn!(len = data.len(), "non-UTF8 binary frame, closing connection");
                    break;
                };
                parse_frame(text)
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        };

        match parsed {
            Ok(incoming) => handle_incoming(&registry, &commands, &session, incoming).await,
            Err(error) => {
                warn!(%error, "malformed frame, closing connection");
                counter!("ws_malformed_frames_total").increment(1);
                break;
            }
        }
    }

    let _ = registry.unregister(&session.id);
    session.close();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut outbound)
        .await
        .is_err()
    {
        outbound.abort();
    }
    info!(
        dropped_events = session.dropped_events(),
        "client disconnected"
    );
    counter!("ws_disconnections_total").increment(1);
    histogram!("ws_connection_duration_seconds").record(started.elapsed().as_secs_f64());
}

/// Server commands complete before the next frame is read so the
/// handshake is never reordered. Everything else is spawned.
async fn handle_incoming(
    registry: &Arc<SessionRegistry>,
    commands: &Arc<CommandRegistry>,
    session: &Arc<Session>,
    incoming: IncomingMessage,
) {
    let IncomingMessage {
        message_id,
        command_name,
        command,
    } = incoming;
    let ctx = CommandContext {
        registry: Arc::clone(registry),
        session: Arc::clone(session),
        message_id,
    };

    if matches!(command, Ok(Command::Server(_)) | Err(_)) {
        commands.execute(ctx, &command_name, command).await;
        return;
    }

    let commands = Arc::clone(commands);
    drop(tokio::spawn(async move {
        commands.execute(ctx, &command_name, command).await;
    }));
}
