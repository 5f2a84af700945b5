//! Error types reported by the router.
//!
//! None of these close a connection. Decode failures are logged and the
//! frame is dropped; call failures are additionally surfaced to the
//! application through [`RouterObserver::on_call_failed`](super::RouterObserver::on_call_failed).

use wamp_core::DecodeError;

/// Why a `Call` could not be delivered to an application handler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the procedure.
    #[error("no handler registered for procedure {proc_uri}")]
    NoHandler { proc_uri: String },
    /// The call arguments do not deserialize into the registered shape.
    #[error("arguments for {proc_uri} do not match {shape}: {source}")]
    PayloadShape {
        proc_uri: String,
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DispatchError {
    /// Procedure URI the failed call targeted.
    #[must_use]
    pub fn proc_uri(&self) -> &str {
        match self {
            DispatchError::NoHandler { proc_uri } | DispatchError::PayloadShape { proc_uri, .. } => {
                proc_uri
            }
        }
    }
}

/// Outcome of routing one inbound frame, when it was not handled.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The frame could not be decoded, or is a type peers may not send.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A `Call` could not be dispatched.
    #[error("call {call_id} failed: {source}")]
    Call {
        call_id: String,
        #[source]
        source: DispatchError,
    },
}
