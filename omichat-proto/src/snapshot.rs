//! Persisted client snapshot.
//!
//! The snapshot is what survives a restart: the logged-in user, the newest
//! slice of history, the highest id seen and the online-user list. Every
//! field defaults, so partial or older snapshots still load.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId};

/// Number of history entries kept in a snapshot.
pub const SNAPSHOT_MESSAGE_LIMIT: usize = 100;

/// Delivery state of a history entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Fetched from the remote store.
    #[default]
    Stored,
    /// Local echo whose write request has not resolved yet.
    Pending,
    /// Local echo the store accepted.
    Sent,
    /// Local echo whose write failed or was rejected.
    Failed,
}

impl Delivery {
    /// Get the display symbol for this state.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Stored => "",
            Self::Pending => "\u{22ef}",
            Self::Sent => "\u{2713}",
            Self::Failed => "\u{2717}",
        }
    }
}

/// A message as held in history, with local bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The message itself.
    #[serde(flatten)]
    pub message: Message,
    /// Whether the local user wrote it.
    #[serde(rename = "isOwn", default)]
    pub is_own: bool,
    /// Delivery state; [`Delivery::Stored`] for fetched messages.
    #[serde(default)]
    pub delivery: Delivery,
}

impl HistoryEntry {
    /// Entry for a message fetched from the store.
    #[must_use]
    pub fn stored(message: Message, own_user: &str) -> Self {
        let is_own = message.author == own_user;
        Self {
            message,
            is_own,
            delivery: Delivery::Stored,
        }
    }

    /// Whether this entry is an optimistic local echo rather than a fetched
    /// message.
    #[must_use]
    pub fn is_local_echo(&self) -> bool {
        self.delivery != Delivery::Stored
    }
}

/// Persisted client state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    /// User the snapshot belongs to.
    pub current_user: String,
    /// Newest history entries, oldest first.
    pub messages: Vec<HistoryEntry>,
    /// Highest store id seen.
    pub last_message_id: MessageId,
    /// Online users as last displayed.
    pub online_users: Vec<String>,
}

impl Snapshot {
    /// Parses a snapshot from JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Serializes the snapshot to JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
