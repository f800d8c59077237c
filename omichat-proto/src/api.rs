//! JSON codec for the remote message store API.
//!
//! - Read: `GET <endpoint>?t=<cache buster>` returns an array of
//!   `{id, user, message, timestamp}`. Anything that is not an array is an
//!   empty feed.
//! - Write: `POST <endpoint>` with `{user, message, session, version}` returns
//!   `{success, id?, timestamp?}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::message::{Message, MessageId, WireMessage, lenient_id};

/// Error type for API encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The body is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(String),
    /// The body is JSON but not of the expected shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    /// A request could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Body of a write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    /// Sender name.
    pub user: String,
    /// Message text.
    pub message: String,
    /// Client session identifier.
    pub session: String,
    /// Client version.
    pub version: String,
}

/// Body of a write response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendResponse {
    /// Whether the store accepted the message. Anything other than JSON
    /// `true` counts as a rejection.
    #[serde(default, deserialize_with = "deserialize_strict_true")]
    pub success: bool,
    /// Id the store assigned, if it reported one. A zero id is treated as
    /// absent.
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<MessageId>,
    /// Store-side timestamp, if reported.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Decodes the body of a read response into messages, in feed order.
///
/// Non-array bodies decode as an empty feed, and non-object array elements
/// are skipped.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the body is not JSON at all.
pub fn decode_feed(bytes: &[u8]) -> Result<Vec<Message>, CodecError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value::<WireMessage>(item).ok())
        .map(Message::from)
        .collect())
}

/// Encodes a write request body.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if serialization fails.
pub fn encode_send(request: &SendRequest) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(request).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes the body of a write response.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] for non-JSON bodies and
/// [`CodecError::UnexpectedShape`] when the JSON is not an object.
pub fn decode_send_response(bytes: &[u8]) -> Result<SendResponse, CodecError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(CodecError::UnexpectedShape(format!(
            "expected an object, got {value}"
        )));
    }
    serde_json::from_value(value).map_err(|e| CodecError::UnexpectedShape(e.to_string()))
}

fn deserialize_strict_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)? == Value::Bool(true))
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<MessageId>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = lenient_id(&Value::deserialize(deserializer)?);
    Ok((id != 0).then_some(MessageId::new(id)))
}
