//! Wire-compatible message envelopes for the WAMP v1 protocol.
//!
//! Every frame is a JSON array whose first element is an integer type tag.
//! Inbound (client-to-router) envelopes are decoded by [`inbound`];
//! router-to-client envelopes are produced by the pure encoders in
//! [`outbound`].

use std::fmt;

pub mod inbound;
pub mod outbound;

pub use inbound::{decode, decode_fields, InboundMessage, PublishAudience};

/// Protocol version announced in every `Welcome` envelope.
pub const PROTOCOL_VERSION: u64 = 1;

/// Message type tag, the first element of every envelope.
///
/// Tag values are fixed by the protocol and must match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Welcome = 0,
    Prefix = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
    Subscribe = 5,
    Unsubscribe = 6,
    Publish = 7,
    Event = 8,
}

impl MessageType {
    /// All message types in tag order.
    pub const ALL: [MessageType; 9] = [
        MessageType::Welcome,
        MessageType::Prefix,
        MessageType::Call,
        MessageType::CallResult,
        MessageType::CallError,
        MessageType::Subscribe,
        MessageType::Unsubscribe,
        MessageType::Publish,
        MessageType::Event,
    ];

    /// Numeric tag written on the wire.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Maps a wire tag back to its message type.
    #[must_use]
    pub fn from_tag(tag: i64) -> Option<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Whether this type only ever travels from the router to a client.
    ///
    /// Receiving one of these from a peer is a protocol violation.
    #[must_use]
    pub const fn is_outbound_only(self) -> bool {
        matches!(
            self,
            MessageType::Welcome
                | MessageType::CallResult
                | MessageType::CallError
                | MessageType::Event
        )
    }

    /// Stable lowercase name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::Welcome => "welcome",
            MessageType::Prefix => "prefix",
            MessageType::Call => "call",
            MessageType::CallResult => "call_result",
            MessageType::CallError => "call_error",
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
            MessageType::Publish => "publish",
            MessageType::Event => "event",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from decoding an inbound frame.
///
/// None of these are fatal to the connection; the router logs them and drops
/// the frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("frame does not start with an integer message type")]
    MissingType,
    #[error("unknown message type {0}")]
    UnknownType(i64),
    #[error("{0} messages are router-to-client only")]
    OutboundOnly(MessageType),
    #[error("{kind} message expects {expected} fields, got {actual}")]
    FieldCount {
        kind: MessageType,
        expected: &'static str,
        actual: usize,
    },
    #[error("{kind} message field `{field}` must be a string")]
    FieldType {
        kind: MessageType,
        field: &'static str,
    },
}

impl DecodeError {
    /// Whether the peer sent a message type it must never send.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, DecodeError::UnknownType(_) | DecodeError::OutboundOnly(_))
    }
}
