//! Reconciliation of fetched messages into local state.

use omichat_proto::message::{Message, MessageId};
use omichat_proto::snapshot::{Delivery, HistoryEntry, Snapshot};

use super::history::History;
use super::presence::Presence;

/// Result of merging one fetched feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Entries appended to history, ascending by id.
    pub entries: Vec<HistoryEntry>,
    /// Whether the online-user set gained a member.
    pub presence_changed: bool,
}

/// Local view of the conversation.
///
/// Invariants:
/// - `last_seen_id` never decreases.
/// - `history.len() <= history.capacity()`.
/// - every history entry has `id <= last_seen_id` or is a local echo.
/// - local echo ids strictly increase.
#[derive(Debug, Clone)]
pub struct ReconciliationState {
    last_seen_id: MessageId,
    /// Id handed to the newest local echo.
    last_temp_id: MessageId,
    presence: Presence,
    history: History,
}

impl ReconciliationState {
    /// Empty state for `own_user`.
    #[must_use]
    pub fn new(own_user: &str, capacity: usize) -> Self {
        Self {
            last_seen_id: MessageId::ZERO,
            last_temp_id: MessageId::ZERO,
            presence: Presence::new(own_user),
            history: History::with_capacity(capacity),
        }
    }

    /// Restores state from a snapshot taken for the same user.
    ///
    /// Stored entries newer than the snapshot's `last_message_id` cannot be
    /// trusted and are dropped; local echoes are kept.
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot, own_user: &str, capacity: usize) -> Self {
        let last_seen_id = snapshot.last_message_id.max(MessageId::ZERO);
        let entries: Vec<HistoryEntry> = snapshot
            .messages
            .into_iter()
            .filter(|e| e.is_local_echo() || e.message.id <= last_seen_id)
            .collect();
        let last_temp_id = entries
            .iter()
            .filter(|e| e.is_local_echo())
            .map(|e| e.message.id)
            .max()
            .unwrap_or(MessageId::ZERO);
        Self {
            last_seen_id,
            last_temp_id,
            presence: Presence::from_users(own_user, &snapshot.online_users),
            history: History::from_entries(entries, capacity),
        }
    }

    /// Merges a fetched feed.
    ///
    /// Only messages with an id above the current `last_seen_id` are applied,
    /// in ascending id order; a repeated id within one feed is applied once.
    pub fn apply_feed(&mut self, mut feed: Vec<Message>) -> Applied {
        feed.retain(|m| m.id > self.last_seen_id);
        feed.sort_by_key(|m| m.id);

        let mut applied = Applied::default();
        for message in feed {
            if message.id <= self.last_seen_id {
                continue;
            }
            self.last_seen_id = message.id;
            applied.presence_changed |= self.presence.observe(&message.author);
            let entry = HistoryEntry::stored(message, self.presence.own_user());
            self.history.push(entry.clone());
            applied.entries.push(entry);
        }
        applied
    }

    /// Appends an optimistic echo of an outgoing message and returns it.
    ///
    /// The echo carries a wall-clock temporary id and does not move
    /// `last_seen_id`. Echoes created within the same millisecond get
    /// successive ids, so each one can be confirmed on its own.
    pub fn echo_local(&mut self, body: &str, sent_at: String) -> HistoryEntry {
        let id = MessageId::temporary().max(self.last_temp_id.next());
        self.last_temp_id = id;
        let entry = HistoryEntry {
            message: Message {
                id,
                author: self.presence.own_user().to_string(),
                body: body.to_string(),
                sent_at,
            },
            is_own: true,
            delivery: Delivery::Pending,
        };
        self.history.push(entry.clone());
        entry
    }

    /// Marks an echo as accepted by the store.
    ///
    /// The echo keeps its temporary id. If the store reported the id it
    /// assigned, `last_seen_id` advances to it so the next poll does not
    /// fetch the same message back.
    pub fn confirm_send(&mut self, temp_id: MessageId, server_id: Option<MessageId>) {
        self.history.set_delivery(temp_id, Delivery::Sent);
        if let Some(id) = server_id {
            self.last_seen_id = self.last_seen_id.max(id);
        }
    }

    /// Marks an echo as failed. The echo stays in history.
    pub fn fail_send(&mut self, temp_id: MessageId) {
        self.history.set_delivery(temp_id, Delivery::Failed);
    }

    /// Trims the online-user set, returning dropped users.
    pub fn prune_presence(&mut self, keep: usize) -> Vec<String> {
        self.presence.prune(keep)
    }

    /// Drops local history. `last_seen_id` is kept so cleared messages are
    /// not fetched again.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Snapshot holding at most `message_limit` of the newest entries.
    #[must_use]
    pub fn snapshot(&self, message_limit: usize) -> Snapshot {
        Snapshot {
            current_user: self.presence.own_user().to_string(),
            messages: self.history.newest(message_limit),
            last_message_id: self.last_seen_id,
            online_users: self.presence.users(),
        }
    }

    /// Highest store id seen.
    #[must_use]
    pub const fn last_seen_id(&self) -> MessageId {
        self.last_seen_id
    }

    /// Known users, local user first.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        self.presence.users()
    }

    /// The history.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }
}
