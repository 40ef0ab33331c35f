//! Message model shared by every pipeline stage.
//!
//! # Data Flow
//! ```text
//! upstream source
//!     → Message { headers, payload }           (inbound)
//!     → gateway pipeline
//!     → Message                                (output / retry-feedback / analytics)
//! ```
//!
//! # Design Decisions
//! - Header values are JSON values so numeric headers (status codes) stay numeric
//! - Payload is always raw bytes; JSON payloads are parsed where they are needed
//! - On the JSON-lines wire, payloads that are neither JSON nor UTF-8 travel as base64

pub mod headers;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Ordered message header map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHeaders(BTreeMap<String, Value>);

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Header as text. Numbers and booleans are rendered, other types are ignored.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_u16(&self, name: &str) -> Option<u16> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A unit of transport: headers plus an opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct Message {
    pub headers: MessageHeaders,
    pub payload: Bytes,
}

impl Message {
    pub fn new(headers: MessageHeaders, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
        }
    }

    /// A header-only message.
    pub fn empty(headers: MessageHeaders) -> Self {
        Self {
            headers,
            payload: Bytes::new(),
        }
    }

    /// Correlation id carried by this message, if any.
    pub fn continuation_id(&self) -> Option<String> {
        self.headers.get_str(headers::CONTINUATION_ID)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PayloadEncoding {
    Base64,
}

/// JSON form of a message. JSON payloads are embedded as-is, text travels
/// as a string and anything else as base64 tagged by `payloadEncoding`.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(default)]
    headers: MessageHeaders,
    #[serde(default)]
    payload: Value,
    #[serde(
        default,
        rename = "payloadEncoding",
        skip_serializing_if = "Option::is_none"
    )]
    payload_encoding: Option<PayloadEncoding>,
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        let Message { headers, payload } = message;
        let (payload, payload_encoding) = match serde_json::from_slice::<Value>(&payload) {
            Ok(value) if !payload.is_empty() => (value, None),
            _ => match std::str::from_utf8(&payload) {
                Ok(text) => (Value::String(text.to_string()), None),
                Err(_) => (
                    Value::String(BASE64.encode(&payload)),
                    Some(PayloadEncoding::Base64),
                ),
            },
        };
        Self {
            headers,
            payload,
            payload_encoding,
        }
    }
}

/// Errors turning a JSON line back into a message.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("base64 payload must be a string")]
    NotAString,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl TryFrom<WireMessage> for Message {
    type Error = WireError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let payload = match (wire.payload_encoding, wire.payload) {
            (Some(PayloadEncoding::Base64), Value::String(encoded)) => {
                Bytes::from(BASE64.decode(encoded)?)
            }
            (Some(PayloadEncoding::Base64), _) => return Err(WireError::NotAString),
            (None, Value::Null) => Bytes::new(),
            (None, Value::String(s)) => Bytes::from(s),
            (None, other) => Bytes::from(other.to_string()),
        };
        Ok(Self::new(wire.headers, payload))
    }
}
