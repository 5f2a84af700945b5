//! Encoders for router-to-client envelopes.
//!
//! Pure formatting over the field tuples; each returns the compact JSON text
//! of one frame.

use serde_json::Value;

use super::{MessageType, PROTOCOL_VERSION};

fn envelope(kind: MessageType, fields: impl IntoIterator<Item = Value>) -> String {
    let mut array = vec![Value::from(kind.tag())];
    array.extend(fields);
    Value::Array(array).to_string()
}

/// `[0, sessionId, 1, serverIdentity]`
#[must_use]
pub fn welcome(session_id: &str, server_identity: &str) -> String {
    envelope(
        MessageType::Welcome,
        [
            Value::from(session_id),
            Value::from(PROTOCOL_VERSION),
            Value::from(server_identity),
        ],
    )
}

/// `[3, callId, result]`
#[must_use]
pub fn call_result(call_id: &str, result: &Value) -> String {
    envelope(
        MessageType::CallResult,
        [Value::from(call_id), result.clone()],
    )
}

/// `[4, callId, errorUri, errorDesc]` or `[4, callId, errorUri, errorDesc, errorDetails]`.
///
/// `details` is left out of the envelope entirely when `None`; it is never
/// encoded as `null`.
#[must_use]
pub fn call_error(
    call_id: &str,
    error_uri: &str,
    error_desc: &str,
    details: Option<&Value>,
) -> String {
    let mut fields = vec![
        Value::from(call_id),
        Value::from(error_uri),
        Value::from(error_desc),
    ];
    if let Some(details) = details {
        fields.push(details.clone());
    }
    envelope(MessageType::CallError, fields)
}

/// `[8, topicUri, event]`
#[must_use]
pub fn event(topic: &str, event: &Value) -> String {
    envelope(MessageType::Event, [Value::from(topic), event.clone()])
}
