//! Router observer trait and composite implementation.
//!
//! [`RouterObserver`] is how the embedding application reacts to router
//! activity; [`CompositeObserver`] fans each notification out to several
//! observers. Observers are registered once at setup, before the router is
//! shared between connection tasks.

use std::sync::Arc;

use serde_json::Value;

use super::error::DispatchError;
use super::fanout::Audience;
use crate::network::ConnectionId;

/// Notifications raised by [`WampRouter`](super::WampRouter).
///
/// Every method has an empty default so implementations only override what
/// they need. Methods run synchronously on the connection task that caused
/// them and must not block.
pub trait RouterObserver: Send + Sync {
    /// A connection opened and its `Welcome` was queued.
    fn on_welcome(&self, _conn: ConnectionId) {}

    /// A connection registered `prefix -> uri`.
    fn on_prefix(&self, _conn: ConnectionId, _prefix: &str, _uri: &str) {}

    /// A call was handed to its registered handler.
    fn on_call(&self, _conn: ConnectionId, _call_id: &str, _proc_uri: &str) {}

    /// A call had no handler or did not fit the handler's payload shape.
    fn on_call_failed(&self, _conn: ConnectionId, _call_id: &str, _error: &DispatchError) {}

    /// A connection subscribed to an (expanded) topic.
    fn on_subscribe(&self, _conn: ConnectionId, _topic: &str) {}

    /// A connection unsubscribed from an (expanded) topic.
    fn on_unsubscribe(&self, _conn: ConnectionId, _topic: &str) {}

    /// A connection published an event. Raised once per publish, however
    /// many recipients it reached.
    fn on_publish(&self, _conn: ConnectionId, _topic: &str, _event: &Value, _audience: &Audience) {}

    /// A connection closed and its prefixes and subscriptions were dropped.
    fn on_close(&self, _conn: ConnectionId) {}
}

/// Composite observer that forwards to every registered observer in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn RouterObserver>>,
}

impl CompositeObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn RouterObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn RouterObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RouterObserver for CompositeObserver {
    fn on_welcome(&self, conn: ConnectionId) {
        for observer in &self.observers {
            observer.on_welcome(conn);
        }
    }

    fn on_prefix(&self, conn: ConnectionId, prefix: &str, uri: &str) {
        for observer in &self.observers {
            observer.on_prefix(conn, prefix, uri);
        }
    }

    fn on_call(&self, conn: ConnectionId, call_id: &str, proc_uri: &str) {
        for observer in &self.observers {
            observer.on_call(conn, call_id, proc_uri);
        }
    }

    fn on_call_failed(&self, conn: ConnectionId, call_id: &str, error: &DispatchError) {
        for observer in &self.observers {
            observer.on_call_failed(conn, call_id, error);
        }
    }

    fn on_subscribe(&self, conn: ConnectionId, topic: &str) {
        for observer in &self.observers {
            observer.on_subscribe(conn, topic);
        }
    }

    fn on_unsubscribe(&self, conn: ConnectionId, topic: &str) {
        for observer in &self.observers {
            observer.on_unsubscribe(conn, topic);
        }
    }

    fn on_publish(&self, conn: ConnectionId, topic: &str, event: &Value, audience: &Audience) {
        for observer in &self.observers {
            observer.on_publish(conn, topic, event, audience);
        }
    }

    fn on_close(&self, conn: ConnectionId) {
        for observer in &self.observers {
            observer.on_close(conn);
        }
    }
}
