//! Wire format: JSON objects terminated by a single record separator (0x1E).
//!
//! No length prefix and no other framing. One transport frame may carry
//! several messages back to back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u64 = 1;

pub mod message_type {
    pub const INVOCATION: i64 = 1;
    pub const STREAM_ITEM: i64 = 2;
    pub const COMPLETION: i64 = 3;
    pub const STREAM_INVOCATION: i64 = 4;
    pub const CANCEL_INVOCATION: i64 = 5;
    pub const PING: i64 = 6;
}

// ────────────────────────────────────────────────────────────────────────────
// Handshake
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Invalid handshake JSON")]
    InvalidJson,

    #[error("Unsupported protocol")]
    Unsupported,
}

/// Accepts exactly `{"protocol":"json","version":1}` (extra fields ignored).
pub fn check_handshake(text: &str) -> Result<(), HandshakeError> {
    let request: Value = serde_json::from_str(text).map_err(|_| HandshakeError::InvalidJson)?;
    let protocol = request.get("protocol").and_then(Value::as_str);
    let version = request.get("version").and_then(Value::as_u64);
    if protocol == Some(PROTOCOL_NAME) && version == Some(PROTOCOL_VERSION) {
        Ok(())
    } else {
        Err(HandshakeError::Unsupported)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Messages
// ────────────────────────────────────────────────────────────────────────────

/// Body of both unary (type 1) and streaming (type 4) invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMessage {
    /// Absent means fire-and-forget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamItemMessage {
    pub invocation_id: String,
    pub item: Value,
}

/// At most one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionMessage {
    pub fn empty(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result: None,
            error: None,
        }
    }

    /// A `null` result is sent as a completion without `result`.
    pub fn with_result(invocation_id: impl Into<String>, result: Value) -> Self {
        Self {
            result: (!result.is_null()).then_some(result),
            ..Self::empty(invocation_id)
        }
    }

    pub fn with_error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(invocation_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvocationMessage {
    #[serde(default)]
    pub invocation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(InvocationMessage),
    StreamItem(StreamItemMessage),
    Completion(CompletionMessage),
    StreamInvocation(InvocationMessage),
    CancelInvocation(CancelInvocationMessage),
    Ping,
    /// Missing, non-integer or unsupported `type`.
    Unrecognized(Option<i64>),
}

impl HubMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let message = match value.get("type").and_then(Value::as_i64) {
            Some(message_type::INVOCATION) => Self::Invocation(serde_json::from_value(value)?),
            Some(message_type::STREAM_ITEM) => Self::StreamItem(serde_json::from_value(value)?),
            Some(message_type::COMPLETION) => Self::Completion(serde_json::from_value(value)?),
            Some(message_type::STREAM_INVOCATION) => {
                Self::StreamInvocation(serde_json::from_value(value)?)
            }
            Some(message_type::CANCEL_INVOCATION) => {
                Self::CancelInvocation(serde_json::from_value(value)?)
            }
            Some(message_type::PING) => Self::Ping,
            other => Self::Unrecognized(other),
        };
        Ok(message)
    }

    pub fn message_type(&self) -> Option<i64> {
        match self {
            Self::Invocation(_) => Some(message_type::INVOCATION),
            Self::StreamItem(_) => Some(message_type::STREAM_ITEM),
            Self::Completion(_) => Some(message_type::COMPLETION),
            Self::StreamInvocation(_) => Some(message_type::STREAM_INVOCATION),
            Self::CancelInvocation(_) => Some(message_type::CANCEL_INVOCATION),
            Self::Ping => Some(message_type::PING),
            Self::Unrecognized(t) => *t,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let body = match self {
            Self::Invocation(m) | Self::StreamInvocation(m) => serde_json::to_value(m)?,
            Self::StreamItem(m) => serde_json::to_value(m)?,
            Self::Completion(m) => serde_json::to_value(m)?,
            Self::CancelInvocation(m) => serde_json::to_value(m)?,
            Self::Ping | Self::Unrecognized(_) => Value::Object(Map::new()),
        };
        let mut object = match body {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        if let Some(t) = self.message_type() {
            object.insert("type".to_string(), Value::from(t));
        }
        Ok(Value::Object(object))
    }

    /// JSON text plus the trailing record separator.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(frame(&self.to_value()?))
    }
}

/// Serializes `value` and appends the record separator.
pub fn frame(value: &Value) -> String {
    let mut text = value.to_string();
    text.push(RECORD_SEPARATOR);
    text
}

/// Non-empty messages of one inbound frame, in order.
pub fn split_frame(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
}
