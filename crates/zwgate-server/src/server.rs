//! `GatewayServer`: axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use zwgate_core::Driver;

use crate::commands::CommandRegistry;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::ids::SessionId;
use crate::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::run_connection;
use crate::websocket::heartbeat::run_heartbeat;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to read local address: {0}")]
    LocalAddr(std::io::Error),
}

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub commands: Arc<CommandRegistry>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    commands: Arc<CommandRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, driver: Arc<dyn Driver>) -> Self {
        let registry = SessionRegistry::new(driver, config.registry_config());
        Self {
            config,
            registry,
            commands: Arc::new(CommandRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            commands: Arc::clone(&self.commands),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the listener and start serving plus the heartbeat sweep.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(error) = result {
                warn!(%error, "server stopped with an error");
            }
        });

        let heartbeat = tokio::spawn({
            let registry = Arc::clone(&self.registry);
            let interval = self.config.heartbeat_interval();
            let token = self.shutdown.token();
            async move {
                let disconnected = run_heartbeat(registry, interval, token).await;
                info!(disconnected, "heartbeat stopped");
            }
        });

        info!(
            %local_addr,
            min_schema = self.config.min_schema_version,
            max_schema = self.config.max_schema_version,
            "gateway listening"
        );

        Ok(ServerHandle {
            local_addr,
            registry: self.registry,
            shutdown: self.shutdown,
            tasks: vec![server, heartbeat],
        })
    }
}

/// A running server. Dropping it leaves the tasks running; call
/// [`ServerHandle::shutdown`] to stop them.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.local_addr)
    }

    pub async fn shutdown(self) {
        self.shutdown
            .graceful_shutdown(&self.registry, self.tasks, None)
            .await;
        info!("gateway stopped");
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| {
        run_connection(socket, SessionId::new(), state.registry, state.commands)
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = &state.registry;
    Json(health::health_check(
        state.start_time,
        registry.session_count(),
        registry.listening_count(),
        registry.driver().home_id(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
