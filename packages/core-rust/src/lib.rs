//! WAMP Core: message type tags, envelope decoding and encoding, and URI helpers.

pub mod messages;
pub mod uri;

pub use messages::{
    decode, DecodeError, InboundMessage, MessageType, PublishAudience, PROTOCOL_VERSION,
};
pub use uri::{is_absolute_uri, split_curie, Curie};
