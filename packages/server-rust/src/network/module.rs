//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` wires the router in,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Binding separately lets callers learn the OS-assigned port
//! before any traffic arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::connection::{ConnectionRegistry, OutboundMessage};
use super::handlers::{health_handler, liveness_handler, ws_upgrade_handler, AppState};
use super::middleware::build_http_layers;
use crate::service::WampRouter;

/// How often the drain loop re-checks for connections still open.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Manages the full HTTP/WebSocket server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- takes the shared router
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    router: Arc<WampRouter>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, router: Arc<WampRouter>) -> Self {
        Self {
            config,
            listener: None,
            router,
        }
    }

    /// Returns a shared reference to the router.
    #[must_use]
    pub fn router(&self) -> Arc<WampRouter> {
        Arc::clone(&self.router)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- router statistics JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /ws` -- WebSocket upgrade into a WAMP session
    pub fn build_router(&self) -> Router {
        let state = AppState {
            router: Arc::clone(&self.router),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/ws", get(ws_upgrade_handler))
            .layer(build_http_layers())
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. The listener stops accepting new connections
    /// 2. All connections receive a Close frame
    /// 3. Waits up to `drain_timeout` for their sessions to end
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .expect("start() must be called before serve()");

        info!("Serving WAMP over WebSocket");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        drain_connections(self.router.registry(), self.config.drain_timeout).await;
        Ok(())
    }
}

/// Sends a Close frame to every live connection, then waits up to `timeout`
/// for their sessions to end.
///
/// Returns `true` if every session ended in time.
async fn drain_connections(registry: &ConnectionRegistry, timeout: Duration) -> bool {
    let handles = registry.drain_all();
    if handles.is_empty() {
        return true;
    }

    info!("Draining {} connections", handles.len());
    for handle in &handles {
        let _ = handle.try_send(OutboundMessage::Close(Some(
            "server shutting down".to_string(),
        )));
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let open = handles.iter().filter(|handle| handle.is_connected()).count();
        if open == 0 {
            info!("All connections drained successfully");
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("Drain timeout expired with {} connections still open", open);
            return false;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
