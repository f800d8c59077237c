//! Locally tracked "online" users.
//!
//! There is no presence protocol: a user counts as online once a message from
//! them has been seen. [`Presence`] keeps the local user plus other senders in
//! order of most recent observation, and [`Presence::prune`] trims the list
//! so the display stays short.

use std::collections::VecDeque;

/// Number of non-self senders kept by pruning.
pub const DEFAULT_PRESENCE_KEEP: usize = 4;

/// Recency-ordered set of known users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    own_user: String,
    /// Other senders, least recently observed first.
    others: VecDeque<String>,
}

impl Presence {
    /// Creates a set containing only the local user.
    #[must_use]
    pub fn new(own_user: &str) -> Self {
        Self {
            own_user: own_user.to_string(),
            others: VecDeque::new(),
        }
    }

    /// Restores a set from a persisted list. Order is taken as observation
    /// order; the local user and blanks are skipped.
    #[must_use]
    pub fn from_users(own_user: &str, users: &[String]) -> Self {
        let mut presence = Self::new(own_user);
        for user in users {
            presence.observe(user);
        }
        presence
    }

    /// Records a sender. Returns `true` if the set gained a member.
    ///
    /// Re-observing a known sender moves it to the most recent position.
    pub fn observe(&mut self, user: &str) -> bool {
        if user.is_empty() || user == self.own_user {
            return false;
        }
        if let Some(pos) = self.others.iter().position(|u| u == user) {
            if let Some(existing) = self.others.remove(pos) {
                self.others.push_back(existing);
            }
            return false;
        }
        self.others.push_back(user.to_string());
        true
    }

    /// Shrinks the set to the local user plus the `keep` most recently
    /// observed senders. Returns the users that were dropped.
    pub fn prune(&mut self, keep: usize) -> Vec<String> {
        let excess = self.others.len().saturating_sub(keep);
        self.others.drain(..excess).collect()
    }

    /// All members, local user first, then others least recent first.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        std::iter::once(self.own_user.clone())
            .chain(self.others.iter().cloned())
            .collect()
    }

    /// Number of members, including the local user.
    #[must_use]
    pub fn len(&self) -> usize {
        self.others.len() + 1
    }

    /// Always `false`: the local user is a permanent member.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The local user.
    #[must_use]
    pub fn own_user(&self) -> &str {
        &self.own_user
    }
}
