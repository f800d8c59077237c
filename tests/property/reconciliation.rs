//! Property tests for feed reconciliation.
//!
//! Uses proptest to verify:
//! 1. The last-seen id never decreases and ends at the highest id fetched.
//! 2. Only ids above the prior last-seen id are applied, each once, ascending.
//! 3. History never exceeds its capacity.
//! 4. Re-applying a feed applies nothing.
//! 5. A snapshot restores the same last-seen id and at most its limit of entries.

use proptest::prelude::*;

use omichat::chat::state::ReconciliationState;
use omichat_proto::message::{Message, MessageId};

fn message(id: i64, author: &str) -> Message {
    Message {
        id: MessageId::new(id),
        author: author.to_string(),
        body: format!("message {id}"),
        sent_at: String::new(),
    }
}

/// Strategy for a feed as the store might return it: unordered, with
/// repeats, and with non-positive ids mixed in.
fn arb_feed() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((-5i64..300, "[a-e]"), 0..60)
        .prop_map(|items| items.into_iter().map(|(id, a)| message(id, &a)).collect())
}

proptest! {
    #[test]
    fn last_seen_is_monotonic(feeds in prop::collection::vec(arb_feed(), 1..6)) {
        let mut state = ReconciliationState::new("me", 500);
        for feed in feeds {
            let before = state.last_seen_id();
            let highest = feed.iter().map(|m| m.id).max().unwrap_or(MessageId::ZERO);
            state.apply_feed(feed);
            prop_assert!(state.last_seen_id() >= before);
            prop_assert_eq!(state.last_seen_id(), before.max(highest));
        }
    }

    #[test]
    fn applied_ids_are_new_unique_and_ascending(
        first in arb_feed(),
        second in arb_feed(),
    ) {
        let mut state = ReconciliationState::new("me", 500);
        state.apply_feed(first);
        let prior = state.last_seen_id();

        let applied = state.apply_feed(second);
        let ids: Vec<MessageId> = applied.entries.iter().map(|e| e.message.id).collect();
        prop_assert!(ids.iter().all(|id| *id > prior));
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn history_stays_within_capacity(
        capacity in 1usize..40,
        feeds in prop::collection::vec(arb_feed(), 1..6),
    ) {
        let mut state = ReconciliationState::new("me", capacity);
        for feed in feeds {
            state.apply_feed(feed);
            prop_assert!(state.history().len() <= capacity);
        }
    }

    #[test]
    fn reapplying_a_feed_is_a_no_op(feed in arb_feed()) {
        let mut state = ReconciliationState::new("me", 500);
        state.apply_feed(feed.clone());
        let len = state.history().len();

        let again = state.apply_feed(feed);
        prop_assert!(again.entries.is_empty());
        prop_assert!(!again.presence_changed);
        prop_assert_eq!(state.history().len(), len);
    }

    #[test]
    fn snapshot_restores_last_seen_and_newest_entries(
        feed in arb_feed(),
        limit in 0usize..30,
    ) {
        let mut state = ReconciliationState::new("me", 500);
        state.apply_feed(feed);

        let snapshot = state.snapshot(limit);
        prop_assert!(snapshot.messages.len() <= limit);

        let restored = ReconciliationState::from_snapshot(snapshot, "me", 500);
        prop_assert_eq!(restored.last_seen_id(), state.last_seen_id());
        prop_assert_eq!(restored.history().len(), state.history().len().min(limit));
        prop_assert_eq!(restored.online_users(), state.online_users());
    }
}
