//! Message protocol definitions
//!
//! JSON objects carried in WebSocket data frames. Inbound frames use
//! `{"Channel", "Message"}`, outbound frames use `{"channel", "message"}`.
//! Inbound field names are matched case-insensitively, so an outbound
//! frame parses back as an inbound one.

use std::fmt;
use std::sync::Arc;

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::connection::Connection;
use crate::types::FrameType;

/// Client → Server message
///
/// Field names match in any ASCII casing and a repeated field keeps its
/// last value. Unknown fields are ignored; missing or null fields default
/// to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Handler selector
    pub channel: String,
    /// Opaque payload handed to the handler
    pub message: String,
}

impl InboundMessage {
    /// Decode a raw frame payload (text or binary)
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

impl<'de> Deserialize<'de> for InboundMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(InboundVisitor)
    }
}

struct InboundVisitor;

impl<'de> Visitor<'de> for InboundVisitor {
    type Value = InboundMessage;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with Channel and Message string fields")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut inbound = InboundMessage::default();
        while let Some(key) = map.next_key::<String>()? {
            if key.eq_ignore_ascii_case("channel") {
                if let Some(channel) = map.next_value::<Option<String>>()? {
                    inbound.channel = channel;
                }
            } else if key.eq_ignore_ascii_case("message") {
                if let Some(message) = map.next_value::<Option<String>>()? {
                    inbound.message = message;
                }
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(inbound)
    }
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutMessage {
    pub channel: String,
    pub message: String,
}

impl OutMessage {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Serialize into a WebSocket frame of the given kind
    pub fn to_frame(&self, frame_type: FrameType) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(match frame_type {
            FrameType::Text => Message::Text(json.into()),
            FrameType::Binary => Message::Binary(json.into_bytes().into()),
        })
    }
}

/// One decoded inbound frame waiting for the dispatcher
#[derive(Debug, Clone)]
pub struct Envelope {
    pub channel: String,
    pub message: String,
    pub frame_type: FrameType,
    /// Connection the frame arrived on
    pub connection: Arc<Connection>,
}

impl Envelope {
    pub fn new(inbound: InboundMessage, frame_type: FrameType, connection: Arc<Connection>) -> Self {
        Self {
            channel: inbound.channel,
            message: inbound.message,
            frame_type,
            connection,
        }
    }
}
