// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for the polling sync loop.
//!
//! All tests run on a paused tokio clock, so the 2 s poll interval and the
//! 60 s pruning interval elapse instantly and deterministically.
//!
//! These tests validate:
//! - Only messages above the last-seen id are applied, in ascending order
//! - The loop halts after `max_retries` consecutive failures
//! - A manual refresh clears the failure counter and restarts the loop
//! - Backgrounded ticks never touch the network
//! - Results that arrive after logout are discarded
//! - Presence pruning keeps the local user plus the newest senders

use std::sync::Arc;
use std::time::Duration;

use omichat::chat::connection::SyncStatus;
use omichat::session::{PollOutcome, Session, SessionConfig, SessionEvent};
use omichat::storage::LocalStorage;
use omichat::store::loopback::LoopbackStore;
use omichat_proto::message::{Message, MessageId};
use tokio::sync::mpsc;

type LoopbackSession = Session<Arc<LoopbackStore>>;

fn message(id: i64, author: &str, body: &str) -> Message {
    Message {
        id: MessageId::new(id),
        author: author.to_string(),
        body: body.to_string(),
        sent_at: "2024-01-15T10:30:00.000Z".to_string(),
    }
}

fn session_with(
    store: &Arc<LoopbackStore>,
    config: SessionConfig,
) -> (LoopbackSession, mpsc::Receiver<SessionEvent>) {
    Session::new(Arc::clone(store), None, config)
}

fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn history_ids(session: &LoopbackSession) -> Vec<i64> {
    session
        .history()
        .iter()
        .map(|e| e.message.id.as_i64())
        .collect()
}

// =============================================================================
// Reconciliation through the timer
// =============================================================================

#[tokio::test(start_paused = true)]
async fn timer_polls_pick_up_new_messages() {
    let store = Arc::new(LoopbackStore::new());
    store.seed("bob", "first");
    let (session, mut rx) = session_with(&store, SessionConfig::default());

    session.start("alice").await.unwrap();
    assert_eq!(history_ids(&session), vec![1]);
    drain(&mut rx);

    store.seed("carol", "second");
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    assert_eq!(history_ids(&session), vec![1, 2]);
    assert_eq!(session.online_users(), vec!["alice", "bob", "carol"]);
    let events = drain(&mut rx);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::MessagesApplied(entries) if entries.len() == 1))
    );
    assert!(events.contains(&SessionEvent::PresenceChanged(vec![
        "alice".to_string(),
        "bob".to_string(),
        "carol".to_string(),
    ])));
}

#[tokio::test(start_paused = true)]
async fn only_ids_above_last_seen_are_applied_in_order() {
    let store = Arc::new(LoopbackStore::new());
    for id in 1..=5 {
        store.push_raw(message(id, "bob", &format!("m{id}")));
    }
    let config = SessionConfig {
        max_retries: 3,
        ..SessionConfig::default()
    };
    let (session, _rx) = session_with(&store, config);
    session.start("alice").await.unwrap();
    assert_eq!(session.last_seen_id(), Some(MessageId::new(5)));

    // The feed now reads [1..5, 7, 3, 6]: 3 is old, 7 and 6 arrive out of
    // order and must be applied ascending.
    store.push_raw(message(7, "carol", "seven"));
    store.push_raw(message(3, "bob", "again"));
    store.push_raw(message(6, "carol", "six"));

    let outcome = session.refresh().await.unwrap();
    assert_eq!(outcome, PollOutcome::Synced { applied: 2 });
    assert_eq!(history_ids(&session), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(session.last_seen_id(), Some(MessageId::new(7)));

    // Nothing new on the next poll.
    assert_eq!(
        session.refresh().await.unwrap(),
        PollOutcome::Synced { applied: 0 }
    );
}

// =============================================================================
// Failure accounting and halt
// =============================================================================

#[tokio::test(start_paused = true)]
async fn loop_halts_after_max_retries_and_refresh_resumes() {
    let store = Arc::new(LoopbackStore::new());
    let config = SessionConfig {
        max_retries: 3,
        ..SessionConfig::default()
    };
    let (session, mut rx) = session_with(&store, config);
    session.start("alice").await.unwrap();
    assert!(session.is_polling());
    drain(&mut rx);

    store.set_offline(true);
    // Failures on the ticks at 2 s, 4 s and 6 s.
    tokio::time::sleep(Duration::from_millis(6_100)).await;
    assert!(session.is_halted());
    assert!(!session.is_polling());

    let events = drain(&mut rx);
    assert!(events.contains(&SessionEvent::StatusChanged(SyncStatus::Reconnecting {
        attempt: 1,
        max_attempts: 3,
    })));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StatusChanged(SyncStatus::Halted))
    );

    // No further requests once halted.
    let fetches = store.fetch_count();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(store.fetch_count(), fetches);

    store.set_offline(false);
    store.seed("bob", "back online");
    let outcome = session.refresh().await.unwrap();
    assert_eq!(outcome, PollOutcome::Synced { applied: 1 });
    assert!(!session.is_halted());
    assert!(session.is_polling());
    assert_eq!(session.settings().unwrap().consecutive_failures, 0);

    store.seed("bob", "and polling again");
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(session.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn one_success_resets_the_failure_count() {
    let store = Arc::new(LoopbackStore::new());
    let config = SessionConfig {
        max_retries: 3,
        ..SessionConfig::default()
    };
    let (session, _rx) = session_with(&store, config);
    session.start("alice").await.unwrap();

    // Two failures, one success, two failures: never three in a row.
    store.fail_next(2);
    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert_eq!(session.settings().unwrap().consecutive_failures, 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(session.settings().unwrap().consecutive_failures, 0);
    store.fail_next(2);
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert!(!session.is_halted());
    assert!(session.is_polling());
}

#[tokio::test(start_paused = true)]
async fn refresh_while_halted_and_still_offline_stays_halted() {
    let store = Arc::new(LoopbackStore::new());
    store.set_offline(true);
    let config = SessionConfig {
        max_retries: 1,
        ..SessionConfig::default()
    };
    let (session, _rx) = session_with(&store, config);

    session.start("alice").await.unwrap();
    assert!(session.is_halted());

    let outcome = session.refresh().await.unwrap();
    assert_eq!(outcome, PollOutcome::Failed(SyncStatus::Halted));
    assert!(session.is_halted());
    assert!(!session.is_polling());
}

// =============================================================================
// Foreground / background
// =============================================================================

#[tokio::test(start_paused = true)]
async fn backgrounded_ticks_make_no_requests() {
    let store = Arc::new(LoopbackStore::new());
    let (session, mut rx) = session_with(&store, SessionConfig::default());
    session.start("alice").await.unwrap();

    session.set_foreground(false).await;
    let fetches = store.fetch_count();
    store.seed("bob", "while away");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.fetch_count(), fetches);
    assert!(session.is_polling());
    assert!(session.history().is_empty());
    drain(&mut rx);

    // Coming back polls immediately.
    session.set_foreground(true).await;
    assert_eq!(store.fetch_count(), fetches + 1);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.unread(), 0);
}

#[tokio::test(start_paused = true)]
async fn foregrounding_a_halted_loop_does_not_poll() {
    let store = Arc::new(LoopbackStore::new());
    store.set_offline(true);
    let config = SessionConfig {
        max_retries: 1,
        ..SessionConfig::default()
    };
    let (session, _rx) = session_with(&store, config);
    session.start("alice").await.unwrap();
    assert!(session.is_halted());

    session.set_foreground(false).await;
    let fetches = store.fetch_count();
    session.set_foreground(true).await;
    assert_eq!(store.fetch_count(), fetches);
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn response_arriving_after_logout_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(dir.path()).unwrap();
    let store = Arc::new(LoopbackStore::new().with_latency(Duration::from_secs(1)));
    let (session, _rx) = Session::new(
        Arc::clone(&store),
        Some(storage.clone()),
        SessionConfig::default(),
    );
    let session = Arc::new(session);
    session.start("alice").await.unwrap();

    store.seed("bob", "late");
    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(session.logout().as_deref(), Some("alice"));
    let outcome = pending.await.unwrap().unwrap();

    assert_eq!(outcome, PollOutcome::Inactive);
    assert!(!session.is_active());
    assert!(session.history().is_empty());
    assert!(storage.load_snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn logout_stops_all_timers() {
    let store = Arc::new(LoopbackStore::new());
    let (session, _rx) = session_with(&store, SessionConfig::default());
    session.start("alice").await.unwrap();
    session.logout();

    let fetches = store.fetch_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.fetch_count(), fetches);
    assert!(!session.is_polling());

    // Logging in again starts a fresh loop.
    session.start("alice").await.unwrap();
    assert!(session.is_polling());
}

// =============================================================================
// Presence pruning
// =============================================================================

#[tokio::test(start_paused = true)]
async fn pruning_timer_keeps_newest_four_senders() {
    let store = Arc::new(LoopbackStore::new());
    for sender in ["B", "C", "D", "E", "F"] {
        store.seed(sender, "hello");
    }
    let (session, mut rx) = session_with(&store, SessionConfig::default());
    session.start("A").await.unwrap();
    assert_eq!(session.online_users(), vec!["A", "B", "C", "D", "E", "F"]);
    drain(&mut rx);

    tokio::time::sleep(Duration::from_millis(60_100)).await;

    assert_eq!(session.online_users(), vec!["A", "C", "D", "E", "F"]);
    let events = drain(&mut rx);
    assert!(events.contains(&SessionEvent::PresenceChanged(
        ["A", "C", "D", "E", "F"].map(String::from).to_vec()
    )));
}
