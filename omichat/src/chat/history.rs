//! Bounded local message history.
//!
//! [`History`] holds at most `capacity` entries in arrival order. Pushing past
//! the cap evicts the oldest entry (FIFO). Entries are never reordered or
//! rewritten, except for the delivery state of a local echo.

use std::collections::VecDeque;

use omichat_proto::message::MessageId;
use omichat_proto::snapshot::{Delivery, HistoryEntry};

/// Default number of entries kept in memory.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Bounded, insertion-ordered history.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// Creates an empty history. A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Builds a history from persisted entries, keeping the newest ones if
    /// there are more than `capacity`.
    #[must_use]
    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        for entry in entries {
            history.push(entry);
        }
        history
    }

    /// Appends an entry, returning the evicted oldest entry if the history
    /// was full.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Updates the delivery state of the newest local echo with `id`.
    ///
    /// Returns `false` if no such echo is present (e.g. it was evicted or
    /// the history was cleared while the write was in flight).
    pub fn set_delivery(&mut self, id: MessageId, delivery: Delivery) -> bool {
        match self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.message.id == id && e.is_local_echo())
        {
            Some(entry) => {
                entry.delivery = delivery;
                true
            }
            None => false,
        }
    }

    /// Clones the newest `n` entries, oldest first.
    #[must_use]
    pub fn newest(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
