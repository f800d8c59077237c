//! Message types shared by the wire format and the local snapshot.
//!
//! The remote store is a spreadsheet-backed script, so the feed is loosely
//! typed: ids may arrive as numbers or numeric strings, and any field may be
//! missing. [`WireMessage`] absorbs that looseness and converts into the
//! strict [`Message`] the client works with.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Maximum username length accepted at login, in characters.
pub const MAX_USERNAME_LEN: usize = 20;

/// Numeric message identifier assigned by the remote store.
///
/// Ids are only compared, never interpreted. Locally echoed messages carry a
/// temporary id derived from the wall clock (see [`MessageId::temporary`]).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// The id that precedes every store-assigned id.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// A client-side id for an optimistic echo: wall-clock milliseconds.
    #[must_use]
    pub fn temporary() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// The id right after this one, saturating at `i64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat message as held in local history.
///
/// Field names on the wire of the snapshot (`user`, `text`, `time`) follow the
/// format earlier client versions persisted, so old snapshots keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id, or a temporary id for a local echo.
    pub id: MessageId,
    /// Display name of the sender.
    #[serde(rename = "user", default)]
    pub author: String,
    /// Message text.
    #[serde(rename = "text", default)]
    pub body: String,
    /// Timestamp exactly as the store (or the local clock) rendered it.
    #[serde(rename = "time", default)]
    pub sent_at: String,
}

/// One entry of the store's message feed, decoded leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WireMessage {
    /// Message id; unparseable values decode as `0`.
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: MessageId,
    /// Sender name.
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub user: String,
    /// Message text.
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub message: String,
    /// Store timestamp.
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub timestamp: String,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: wire.id,
            author: wire.user,
            body: wire.message,
            sent_at: wire.timestamp,
        }
    }
}

/// Errors raised when validating user input before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The username is empty after trimming.
    #[error("username must not be empty")]
    EmptyUsername,

    /// The username exceeds the configured maximum.
    #[error("username is {len} characters long (max {max})")]
    UsernameTooLong {
        /// Length in characters.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The message body is empty after trimming.
    #[error("message text must not be empty")]
    EmptyBody,
}

/// Trims and validates a username, returning the value to use.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyUsername`] or
/// [`ValidationError::UsernameTooLong`].
pub fn validate_username(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    let len = name.chars().count();
    if len > max_len {
        return Err(ValidationError::UsernameTooLong { len, max: max_len });
    }
    Ok(name.to_string())
}

/// Trims and validates a message body.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyBody`] if nothing is left after trimming.
pub fn validate_body(raw: &str) -> Result<String, ValidationError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    Ok(body.to_string())
}

/// Interprets a loosely typed id the way `parseInt(x) || 0` would.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn lenient_id(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_leading_int(s),
        _ => 0,
    }
}

fn parse_leading_int(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |n| sign * n)
}

fn lenient_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<MessageId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(MessageId(lenient_id(&value)))
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(lenient_string)
}
