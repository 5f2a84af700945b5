//! Network configuration types for the WAMP server.

use std::time::Duration;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
    /// How long shutdown waits for connections to flush their close frames.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            connection: ConnectionConfig::default(),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-connection configuration controlling backpressure.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded channel capacity for outbound frames per connection.
    ///
    /// Frames published to a peer whose channel is full are dropped.
    pub outbound_channel_capacity: usize,
    /// Largest inbound text frame accepted, in bytes.
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            max_frame_size: 1_048_576, // 1 MB
        }
    }
}
