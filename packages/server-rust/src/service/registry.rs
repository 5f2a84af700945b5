use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use wamp_core::messages::outbound;

use super::error::DispatchError;
use crate::network::{ConnectionHandle, ConnectionId};

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Identifies the call being handled and lets the handler answer it.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Connection that issued the call.
    pub caller: ConnectionId,
    /// Caller-chosen call id, echoed in the reply.
    pub call_id: String,
    reply_to: Option<Arc<ConnectionHandle>>,
}

impl CallContext {
    /// Creates a context. Without `reply_to` every reply is discarded.
    #[must_use]
    pub fn new(
        caller: ConnectionId,
        call_id: impl Into<String>,
        reply_to: Option<Arc<ConnectionHandle>>,
    ) -> Self {
        Self {
            caller,
            call_id: call_id.into(),
            reply_to,
        }
    }

    /// Queues a `CallResult` for the caller.
    ///
    /// Returns `false` if the caller is gone or its channel is full.
    pub fn send_result(&self, result: &Value) -> bool {
        self.send(outbound::call_result(&self.call_id, result))
    }

    /// Queues a `CallError` for the caller.
    pub fn send_error(&self, error_uri: &str, error_desc: &str, details: Option<&Value>) -> bool {
        self.send(outbound::call_error(&self.call_id, error_uri, error_desc, details))
    }

    fn send(&self, frame: String) -> bool {
        self.reply_to
            .as_ref()
            .is_some_and(|handle| handle.send_text(frame))
    }
}

// ---------------------------------------------------------------------------
// CallHandler
// ---------------------------------------------------------------------------

/// Type-erased deserialize-and-invoke closure for one procedure.
type ErasedHandler = dyn Fn(CallContext, Value) -> Result<(), serde_json::Error> + Send + Sync;

/// A registered procedure: the payload shape it expects and its handler.
#[derive(Clone)]
struct CallHandler {
    /// Rust type name of the expected payload, for diagnostics.
    shape: &'static str,
    invoke: Arc<ErasedHandler>,
}

impl std::fmt::Debug for CallHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandler")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CallRegistry
// ---------------------------------------------------------------------------

/// Registry of RPC handlers keyed by absolute procedure URI.
///
/// Each handler declares its payload shape through its type parameter; the
/// registry stores a closure that deserializes the raw call arguments into
/// that shape before invoking it. One handler per URI, last registration
/// wins.
#[derive(Debug, Default)]
pub struct CallRegistry {
    handlers: RwLock<HashMap<String, CallHandler>>,
}

impl CallRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `proc_uri`, replacing any earlier handler.
    ///
    /// Returns `true` if an earlier handler was replaced.
    pub fn register<T, F>(&self, proc_uri: impl Into<String>, handler: F) -> bool
    where
        T: DeserializeOwned + 'static,
        F: Fn(CallContext, T) + Send + Sync + 'static,
    {
        let invoke = move |ctx: CallContext, args: Value| -> Result<(), serde_json::Error> {
            let payload = serde_json::from_value::<T>(args)?;
            handler(ctx, payload);
            Ok(())
        };
        let entry = CallHandler {
            shape: std::any::type_name::<T>(),
            invoke: Arc::new(invoke),
        };
        self.handlers.write().insert(proc_uri.into(), entry).is_some()
    }

    /// Removes the handler for `proc_uri`. Returns `false` if none existed.
    pub fn deregister(&self, proc_uri: &str) -> bool {
        self.handlers.write().remove(proc_uri).is_some()
    }

    /// Deserializes `args` into the registered shape and invokes the handler.
    ///
    /// The lock is released before the handler runs, so handlers may
    /// register or deregister procedures themselves.
    ///
    /// # Errors
    ///
    /// - `DispatchError::NoHandler` if nothing is registered for `proc_uri`
    /// - `DispatchError::PayloadShape` if `args` does not deserialize into the
    ///   registered shape; the handler is not invoked
    pub fn dispatch(
        &self,
        ctx: CallContext,
        proc_uri: &str,
        args: Value,
    ) -> Result<(), DispatchError> {
        let handler = self
            .handlers
            .read()
            .get(proc_uri)
            .cloned()
            .ok_or_else(|| DispatchError::NoHandler {
                proc_uri: proc_uri.to_string(),
            })?;

        (handler.invoke)(ctx, args).map_err(|source| DispatchError::PayloadShape {
            proc_uri: proc_uri.to_string(),
            shape: handler.shape,
            source,
        })
    }

    /// Whether a handler is registered for `proc_uri`.
    #[must_use]
    pub fn contains(&self, proc_uri: &str) -> bool {
        self.handlers.read().contains_key(proc_uri)
    }

    /// Type name of the payload shape registered for `proc_uri`.
    #[must_use]
    pub fn shape_of(&self, proc_uri: &str) -> Option<&'static str> {
        self.handlers.read().get(proc_uri).map(|handler| handler.shape)
    }

    /// Number of registered procedures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no procedures are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
