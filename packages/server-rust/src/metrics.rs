//! Metric names and the Prometheus exporter.
//!
//! Recording goes through the `metrics` facade, so counters are no-ops until
//! [`install_exporter`] installs a global recorder.

use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Installs the global Prometheus recorder and serves `/metrics` on `addr`.
///
/// Must be called from inside a Tokio runtime, at most once per process.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to install prometheus exporter on {addr}"))?;
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

/// Connections opened (counter).
pub const CONNECTIONS_OPENED_TOTAL: &str = "wamp_connections_opened_total";
/// Connections closed (counter).
pub const CONNECTIONS_CLOSED_TOTAL: &str = "wamp_connections_closed_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "wamp_connections_active";
/// Decoded inbound messages (counter, labels: type).
pub const MESSAGES_RECEIVED_TOTAL: &str = "wamp_messages_received_total";
/// Frames that failed to decode (counter, labels: reason).
pub const MESSAGES_REJECTED_TOTAL: &str = "wamp_messages_rejected_total";
/// Events queued on a recipient's channel (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "wamp_events_delivered_total";
/// Events dropped on a full or closed channel (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "wamp_events_dropped_total";
/// Calls handed to a registered handler (counter).
pub const CALLS_DISPATCHED_TOTAL: &str = "wamp_calls_dispatched_total";
/// Calls that could not be dispatched (counter, labels: reason).
pub const CALLS_FAILED_TOTAL: &str = "wamp_calls_failed_total";
