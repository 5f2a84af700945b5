//! Decoding of client-to-router envelopes.

use serde_json::Value;

use super::{DecodeError, MessageType};

/// Who should receive a published event, as requested by the publisher.
///
/// Produced from the variable-arity `Publish` envelope:
///
/// | Envelope | Meaning |
/// |---|---|
/// | `[7, topic, event]` | every subscriber |
/// | `[7, topic, event, _]` | every subscriber except the publisher |
/// | `[7, topic, event, [exclude..], [eligible..]]` | `eligible` minus `exclude` |
///
/// In the five-field form a non-list `exclude` is treated as empty and a
/// non-list `eligible` falls back to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishAudience {
    /// Exclude the publishing connection itself.
    pub exclude_me: bool,
    /// Session ids that must not receive the event.
    pub exclude: Vec<String>,
    /// Session ids that may receive the event; `None` means every subscriber.
    pub eligible: Option<Vec<String>>,
}

/// A decoded client-to-router message.
///
/// URIs are carried exactly as sent; CURIE expansion is per-connection state
/// and happens in the router.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `[1, prefix, uri]`
    Prefix { prefix: String, uri: String },
    /// `[2, callId, procUri, args..]`
    ///
    /// No arguments decode to `null`, one argument is passed through, and
    /// several arguments are collected into an array.
    Call {
        call_id: String,
        proc_uri: String,
        args: Value,
    },
    /// `[5, topicUri]`
    Subscribe { topic: String },
    /// `[6, topicUri]`
    Unsubscribe { topic: String },
    /// `[7, topicUri, event, ..]`
    Publish {
        topic: String,
        event: Value,
        audience: PublishAudience,
    },
}

impl InboundMessage {
    /// The wire type this message was decoded from.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            InboundMessage::Prefix { .. } => MessageType::Prefix,
            InboundMessage::Call { .. } => MessageType::Call,
            InboundMessage::Subscribe { .. } => MessageType::Subscribe,
            InboundMessage::Unsubscribe { .. } => MessageType::Unsubscribe,
            InboundMessage::Publish { .. } => MessageType::Publish,
        }
    }
}

/// Decodes one text frame.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the frame is not a JSON array, carries an
/// unknown or router-to-client type tag, or has the wrong number or type of
/// fields for its tag.
pub fn decode(frame: &str) -> Result<InboundMessage, DecodeError> {
    match serde_json::from_str::<Value>(frame)? {
        Value::Array(fields) => decode_fields(fields),
        _ => Err(DecodeError::NotAnArray),
    }
}

/// Decodes an already-parsed envelope.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_fields(fields: Vec<Value>) -> Result<InboundMessage, DecodeError> {
    let tag = fields
        .first()
        .and_then(Value::as_i64)
        .ok_or(DecodeError::MissingType)?;
    let kind = MessageType::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;
    if kind.is_outbound_only() {
        return Err(DecodeError::OutboundOnly(kind));
    }

    let actual = fields.len();
    let mut rest = fields.into_iter().skip(1);

    match kind {
        MessageType::Prefix => {
            expect_count(kind, actual, 3, "3")?;
            let prefix = take_string(kind, &mut rest, "prefix")?;
            let uri = take_string(kind, &mut rest, "uri")?;
            Ok(InboundMessage::Prefix { prefix, uri })
        }
        MessageType::Call => {
            if actual < 3 {
                return Err(DecodeError::FieldCount {
                    kind,
                    expected: "at least 3",
                    actual,
                });
            }
            let call_id = take_string(kind, &mut rest, "callId")?;
            let proc_uri = take_string(kind, &mut rest, "procUri")?;
            let mut args: Vec<Value> = rest.collect();
            let args = match args.len() {
                0 => Value::Null,
                1 => args.remove(0),
                _ => Value::Array(args),
            };
            Ok(InboundMessage::Call {
                call_id,
                proc_uri,
                args,
            })
        }
        MessageType::Subscribe => {
            expect_count(kind, actual, 2, "2")?;
            let topic = take_string(kind, &mut rest, "topicUri")?;
            Ok(InboundMessage::Subscribe { topic })
        }
        MessageType::Unsubscribe => {
            expect_count(kind, actual, 2, "2")?;
            let topic = take_string(kind, &mut rest, "topicUri")?;
            Ok(InboundMessage::Unsubscribe { topic })
        }
        MessageType::Publish => {
            if !(3..=5).contains(&actual) {
                return Err(DecodeError::FieldCount {
                    kind,
                    expected: "3 to 5",
                    actual,
                });
            }
            let topic = take_string(kind, &mut rest, "topicUri")?;
            let event = rest.next().unwrap_or(Value::Null);
            let audience = match (rest.next(), rest.next()) {
                (None, _) => PublishAudience::default(),
                // The fourth field only signals the form; its value is unused.
                (Some(_), None) => PublishAudience {
                    exclude_me: true,
                    ..PublishAudience::default()
                },
                (Some(exclude), Some(eligible)) => PublishAudience {
                    exclude_me: false,
                    exclude: match exclude {
                        Value::Array(ids) => session_ids(ids),
                        _ => Vec::new(),
                    },
                    eligible: match eligible {
                        Value::Array(ids) => Some(session_ids(ids)),
                        _ => None,
                    },
                },
            };
            Ok(InboundMessage::Publish {
                topic,
                event,
                audience,
            })
        }
        MessageType::Welcome
        | MessageType::CallResult
        | MessageType::CallError
        | MessageType::Event => Err(DecodeError::OutboundOnly(kind)),
    }
}

fn expect_count(
    kind: MessageType,
    actual: usize,
    wanted: usize,
    expected: &'static str,
) -> Result<(), DecodeError> {
    if actual == wanted {
        Ok(())
    } else {
        Err(DecodeError::FieldCount {
            kind,
            expected,
            actual,
        })
    }
}

fn take_string(
    kind: MessageType,
    fields: &mut impl Iterator<Item = Value>,
    field: &'static str,
) -> Result<String, DecodeError> {
    match fields.next() {
        Some(Value::String(s)) => Ok(s),
        _ => Err(DecodeError::FieldType { kind, field }),
    }
}

/// Keeps the string entries of a session id list; anything else is ignored.
fn session_ids(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}
