//! Chat state for OMI Chat.
//!
//! Everything in this module is synchronous and network-free: the
//! [`ReconciliationState`](state::ReconciliationState) that merges fetched
//! messages, the bounded [`History`](history::History), the recency-ordered
//! [`Presence`](presence::Presence) set and the sync loop's
//! [`ConnectionState`](connection::ConnectionState). The session layer drives
//! them from timer and network callbacks.

pub mod connection;
pub mod history;
pub mod presence;
pub mod state;

use chrono::{DateTime, Local};

/// Formats a store timestamp for display in local time.
///
/// The store's timestamps are not guaranteed to be RFC 3339; anything that
/// does not parse is shown verbatim.
#[must_use]
pub fn format_sent_at(raw: &str, format: &str) -> String {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| raw.to_string(),
        |dt| dt.with_timezone(&Local).format(format).to_string(),
    )
}
