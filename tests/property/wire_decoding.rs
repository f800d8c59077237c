//! Property tests for the lenient store codec.
//!
//! Uses proptest to verify:
//! 1. Arbitrary bytes never panic the feed or write-response decoders.
//! 2. Any well-formed feed decodes to the same ids, in feed order.
//! 3. Stringified ids decode to the same value as numeric ones.
//! 4. Snapshots survive serialization with their history intact.

use proptest::prelude::*;
use serde_json::{Value, json};

use omichat_proto::api;
use omichat_proto::message::{Message, MessageId};
use omichat_proto::snapshot::{Delivery, HistoryEntry, Snapshot};

/// Strategy for one feed item as the store would render it.
fn arb_wire_item() -> impl Strategy<Value = (i64, String, String)> {
    (0i64..1_000_000, "[a-zA-Z]{0,12}", "[^\x00]{0,64}")
}

/// Strategy for history entries with any delivery state.
fn arb_history_entry() -> impl Strategy<Value = HistoryEntry> {
    (
        any::<i64>(),
        "[a-z]{1,10}",
        "[^\x00]{0,64}",
        any::<bool>(),
        prop_oneof![
            Just(Delivery::Stored),
            Just(Delivery::Pending),
            Just(Delivery::Sent),
            Just(Delivery::Failed),
        ],
    )
        .prop_map(|(id, author, body, is_own, delivery)| HistoryEntry {
            message: Message {
                id: MessageId::new(id),
                author,
                body,
                sent_at: "2025-06-01T08:30:00.000Z".to_string(),
            },
            is_own,
            delivery,
        })
}

proptest! {
    /// Random bytes never cause a panic in the feed decoder.
    #[test]
    fn random_bytes_decode_feed_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = api::decode_feed(&bytes);
    }

    /// Random bytes never cause a panic in the write-response decoder.
    #[test]
    fn random_bytes_decode_send_response_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = api::decode_send_response(&bytes);
    }

    /// A well-formed feed decodes every item, preserving order.
    #[test]
    fn feed_preserves_ids_and_order(items in prop::collection::vec(arb_wire_item(), 0..40)) {
        let feed: Vec<Value> = items
            .iter()
            .map(|(id, user, message)| json!({
                "id": id,
                "user": user,
                "message": message,
                "timestamp": "2025-06-01T08:30:00.000Z",
            }))
            .collect();
        let bytes = serde_json::to_vec(&feed).unwrap();
        let decoded = api::decode_feed(&bytes).unwrap();

        prop_assert_eq!(decoded.len(), items.len());
        for (msg, (id, user, body)) in decoded.iter().zip(&items) {
            prop_assert_eq!(msg.id, MessageId::new(*id));
            prop_assert_eq!(&msg.author, user);
            prop_assert_eq!(&msg.body, body);
        }
    }

    /// Ids sent as strings decode the same as numeric ids.
    #[test]
    fn string_ids_match_numeric_ids(id in 0i64..i64::MAX) {
        let numeric = api::decode_feed(json!([{ "id": id }]).to_string().as_bytes()).unwrap();
        let text = api::decode_feed(json!([{ "id": id.to_string() }]).to_string().as_bytes()).unwrap();
        prop_assert_eq!(numeric[0].id, text[0].id);
    }

    /// Snapshots keep their history through serialization.
    #[test]
    fn snapshot_keeps_history(
        messages in prop::collection::vec(arb_history_entry(), 0..20),
        last in any::<i64>(),
    ) {
        let snapshot = Snapshot {
            current_user: "alice".to_string(),
            messages,
            last_message_id: MessageId::new(last),
            online_users: vec!["alice".to_string()],
        };
        let bytes = snapshot.to_json().unwrap();
        prop_assert_eq!(Snapshot::from_json(&bytes).unwrap(), snapshot);
    }
}
