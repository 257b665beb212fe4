//! # zwgate
//!
//! Gateway binary: loads settings, installs telemetry and the Prometheus
//! recorder, seeds a simulated Z-Wave network and serves it over WebSocket
//! until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use zwgate_core::sim::SimulatedDriver;
use zwgate_server::protocol::MAX_SCHEMA_VERSION;
use zwgate_server::{GatewayServer, ServerConfig};
use zwgate_settings::GatewaySettings;
use zwgate_telemetry::{init_telemetry, TelemetryConfig};

/// Z-Wave WebSocket gateway.
#[derive(Parser, Debug)]
#[command(name = "zwgate", version, about = "Z-Wave WebSocket gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.zwgate/settings.json`.
    #[arg(long, env = "ZWGATE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Process log level (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Simulated nodes besides the controller (overrides settings).
    #[arg(long)]
    nodes: Option<u16>,
}

impl Cli {
    fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(nodes) = self.nodes {
            settings.simulation.node_count = nodes;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<GatewaySettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(zwgate_settings::settings_path);
    let mut settings = zwgate_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate(MAX_SCHEMA_VERSION)
        .context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let telemetry = TelemetryConfig::from_names(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )
    .context("Invalid logging settings")?;
    init_telemetry(&telemetry).context("Failed to initialise logging")?;

    let driver = Arc::new(SimulatedDriver::new(settings.simulation.node_count));
    let mut server = GatewayServer::new(ServerConfig::from_settings(&settings), driver);
    match zwgate_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(error) => warn!(%error, "metrics disabled"),
    }

    let handle = server.start().await.context("Failed to start server")?;
    info!(url = %handle.ws_url(), nodes = settings.simulation.node_count, "zwgate ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    handle.shutdown().await;
    Ok(())
}
