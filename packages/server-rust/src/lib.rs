//! WAMP Server: WAMP v1 pub/sub and RPC router over axum WebSockets.

pub mod metrics;
pub mod network;
pub mod service;

pub use network::{ConnectionHandle, ConnectionId, ConnectionRegistry, NetworkConfig, NetworkModule};
pub use service::{CallContext, RouterConfig, RouterObserver, WampRouter};
