//! Prometheus recorder and metric descriptions.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder (global) and describe the gateway's
/// metrics. Call once at startup before anything is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

fn describe() {
    describe_counter!("ws_connections_total", "WebSocket connections accepted");
    describe_counter!("ws_disconnections_total", "WebSocket connections closed");
    describe_gauge!("ws_connections_active", "Sessions currently registered");
    describe_counter!("ws_malformed_frames_total", "Frames that were not a request object");
    describe_histogram!(
        "ws_connection_duration_seconds",
        Unit::Seconds,
        "Connection lifetime"
    );
    describe_counter!("commands_total", "Commands received, by namespace");
    describe_counter!("command_errors_total", "Failed commands, by namespace and error code");
    describe_histogram!(
        "command_duration_seconds",
        Unit::Seconds,
        "Command handling time, by namespace"
    );
    describe_counter!("events_forwarded_total", "Event frames queued to sessions, by source");
    describe_counter!("events_dropped_total", "Event frames dropped, by reason");
    describe_counter!("heartbeat_disconnects_total", "Sessions dropped for missing a ping");
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn local_recorder_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("commands_total", "namespace" => "node").increment(2);
        });
        let output = handle.render();
        assert!(output.contains("commands_total{namespace=\"node\"} 2"));
    }
}
