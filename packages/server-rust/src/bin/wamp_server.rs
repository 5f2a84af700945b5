//! `wamp-server` binary: a standalone WAMP v1 router on a WebSocket endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wamp_server::network::ConnectionConfig;
use wamp_server::service::config::{DEFAULT_ERROR_URI_BASE, DEFAULT_SERVER_IDENTITY};
use wamp_server::{ConnectionRegistry, NetworkConfig, NetworkModule, RouterConfig, WampRouter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "wamp-server", version, about)]
struct Args {
    /// Address to bind.
    #[arg(long, env = "WAMP_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on; 0 picks a free port.
    #[arg(long, env = "WAMP_PORT", default_value_t = 8080)]
    port: u16,
    /// Identity announced in every Welcome message.
    #[arg(long, env = "WAMP_SERVER_IDENTITY", default_value = DEFAULT_SERVER_IDENTITY)]
    server_identity: String,
    /// Stem of the error URIs in router-generated CallError replies.
    #[arg(long, env = "WAMP_ERROR_URI_BASE", default_value = DEFAULT_ERROR_URI_BASE)]
    error_uri_base: String,
    /// Do not answer undeliverable calls with a CallError.
    #[arg(long, env = "WAMP_NO_CALL_ERRORS")]
    no_call_errors: bool,
    /// Outbound frames buffered per connection before events are dropped.
    #[arg(long, env = "WAMP_CHANNEL_CAPACITY", default_value_t = 256)]
    channel_capacity: usize,
    /// Largest inbound frame accepted, in bytes.
    #[arg(long, env = "WAMP_MAX_FRAME_SIZE", default_value_t = 1_048_576)]
    max_frame_size: usize,
    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "WAMP_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
    /// Log output format.
    #[arg(long, env = "WAMP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

/// Installs the global subscriber, filtered by `RUST_LOG` (default `info`).
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(addr) = args.metrics_addr {
        wamp_server::metrics::install_exporter(addr)?;
    }

    let router_config = RouterConfig {
        server_identity: args.server_identity,
        reply_call_errors: !args.no_call_errors,
        error_uri_base: args.error_uri_base,
    };
    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        connection: ConnectionConfig {
            outbound_channel_capacity: args.channel_capacity,
            max_frame_size: args.max_frame_size,
        },
        ..NetworkConfig::default()
    };

    let router = Arc::new(WampRouter::new(
        Arc::new(ConnectionRegistry::new()),
        router_config,
    ));
    let mut module = NetworkModule::new(network_config, router);
    let port = module.start().await.context("failed to bind listener")?;
    info!(port, "wamp-server ready at /ws");

    module.serve(shutdown_signal()).await
}
