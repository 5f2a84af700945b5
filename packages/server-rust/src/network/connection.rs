//! Connection handles and the registry of live peers.
//!
//! Each connection owns a bounded mpsc channel drained by its WebSocket
//! write loop, so the router never awaits a peer. The registry is the only
//! owner of handles; every other table stores [`ConnectionId`]s and resolves
//! them here at delivery time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Session identifier of one transport connection.
///
/// Sent to the peer in the `Welcome` envelope and used by publishers in
/// exclude / eligible lists, so it round-trips through its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Frame queued for a connection's write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// An encoded WAMP envelope.
    Text(String),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Handle to a single connection: its id plus the sender end of its
/// outbound channel.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Session identifier.
    pub id: ConnectionId,
    /// Sender end of the bounded outbound channel.
    pub tx: mpsc::Sender<OutboundMessage>,
    /// When this connection was established.
    pub connected_at: Instant,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id and a channel of the given capacity.
    ///
    /// The receiver goes to the write loop, which forwards frames to the wire.
    #[must_use]
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        Self::with_id(ConnectionId::new_v4(), capacity)
    }

    /// Like [`ConnectionHandle::new`] with a caller-chosen id.
    #[must_use]
    pub fn with_id(
        id: ConnectionId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Arc::new(Self {
            id,
            tx,
            connected_at: Instant::now(),
        });
        (handle, rx)
    }

    /// Queues a text frame without blocking.
    ///
    /// Returns `false` if the channel is full or the write loop has exited.
    #[must_use]
    pub fn send_text(&self, frame: impl Into<String>) -> bool {
        self.try_send(OutboundMessage::Text(frame.into()))
    }

    /// Queues any outbound message without blocking.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Returns `false` once the write loop has dropped its receiver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Thread-safe registry of all live connections, keyed by session id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle under its id, returning any handle it displaced.
    pub fn insert(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        self.connections.insert(handle.id, handle)
    }

    /// Removes a connection. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(&id).map(|(_, handle)| handle)
    }

    /// Looks up a connection by id. `None` means the peer is already gone.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|r| r.value().clone())
    }

    /// Whether the id is currently registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of all live connection ids.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Removes and returns all connections. Used during shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut handles = Vec::with_capacity(self.connections.len());
        for id in self.ids() {
            if let Some(handle) = self.remove(id) {
                handles.push(handle);
            }
        }
        handles
    }
}
