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

//! Integration tests for snapshot persistence across restarts.
//!
//! Each test opens [`LocalStorage`] in a fresh temporary directory and
//! simulates a restart by dropping one [`Session`] and creating another over
//! the same directory.
//!
//! These tests validate:
//! - History and last-seen id survive a restart for the same user
//! - A snapshot belonging to another user is ignored
//! - At most the newest 100 entries are persisted
//! - Overlapping sends and polls leave the newest state on disk
//! - Logout deletes the snapshot but keeps the username
//! - Corrupt or inconsistent snapshots are handled gracefully

use std::sync::Arc;
use std::time::Duration;

use omichat::session::{Session, SessionConfig, SessionEvent};
use omichat::storage::{KEY_PREFIX, LocalStorage, SNAPSHOT_KEY};
use omichat::store::loopback::LoopbackStore;
use omichat_proto::message::{Message, MessageId};
use omichat_proto::snapshot::{Delivery, HistoryEntry, Snapshot};
use tempfile::TempDir;
use tokio::sync::mpsc;

type LoopbackSession = Session<Arc<LoopbackStore>>;

fn open_storage() -> (TempDir, LocalStorage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalStorage::open(dir.path()).unwrap();
    (dir, storage)
}

fn session_over(
    store: &Arc<LoopbackStore>,
    storage: &LocalStorage,
) -> (LoopbackSession, mpsc::Receiver<SessionEvent>) {
    Session::new(
        Arc::clone(store),
        Some(storage.clone()),
        SessionConfig::default(),
    )
}

fn stored(id: i64, author: &str, own_user: &str) -> HistoryEntry {
    HistoryEntry::stored(
        Message {
            id: MessageId::new(id),
            author: author.to_string(),
            body: format!("message {id}"),
            sent_at: "2024-01-15T10:30:00.000Z".to_string(),
        },
        own_user,
    )
}

// =============================================================================
// Restore on restart
// =============================================================================

#[tokio::test(start_paused = true)]
async fn restart_restores_history_for_the_same_user() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new());
    for n in 0..3 {
        store.seed("bob", &format!("hello {n}"));
    }

    {
        let (session, _rx) = session_over(&store, &storage);
        session.start("alice").await.unwrap();
        session.send("reply").await.unwrap();
        assert_eq!(session.history().len(), 4);
    }

    let (session, mut rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();

    let started = rx.try_recv().unwrap();
    let SessionEvent::Started {
        user,
        history,
        online_users,
    } = started
    else {
        panic!("expected Started, got {started:?}");
    };
    assert_eq!(user, "alice");
    assert_eq!(history.len(), 4);
    assert_eq!(online_users, vec!["alice", "bob"]);

    // The first poll after restore applies nothing already seen.
    assert_eq!(session.history().len(), 4);
    assert_eq!(session.last_seen_id(), Some(MessageId::new(4)));
    let own = &session.history()[3];
    assert!(own.is_own);
    assert_eq!(own.delivery, Delivery::Sent);
}

#[tokio::test(start_paused = true)]
async fn snapshot_of_another_user_is_ignored() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new());
    store.seed("bob", "hi");
    {
        let (session, _rx) = session_over(&store, &storage);
        session.start("alice").await.unwrap();
    }

    let empty = Arc::new(LoopbackStore::new());
    let (session, _rx) = session_over(&empty, &storage);
    session.start("carol").await.unwrap();

    assert!(session.history().is_empty());
    assert_eq!(session.last_seen_id(), Some(MessageId::ZERO));
    assert_eq!(session.online_users(), vec!["carol"]);
}

#[tokio::test(start_paused = true)]
async fn only_the_newest_hundred_entries_are_persisted() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new());
    for n in 0..150 {
        store.seed("bob", &format!("m{n}"));
    }
    {
        let (session, _rx) = session_over(&store, &storage);
        session.start("alice").await.unwrap();
        assert_eq!(session.history().len(), 150);
    }

    let snapshot = storage.load_snapshot().unwrap();
    assert_eq!(snapshot.messages.len(), 100);
    assert_eq!(snapshot.messages[0].message.id, MessageId::new(51));
    assert_eq!(snapshot.last_message_id, MessageId::new(150));

    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();
    assert_eq!(session.history().len(), 100);
}

#[tokio::test(start_paused = true)]
async fn cleared_history_is_not_refetched_after_restart() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new());
    store.seed("bob", "old news");
    {
        let (session, _rx) = session_over(&store, &storage);
        session.start("alice").await.unwrap();
        session.clear_local_history().unwrap();
    }

    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();
    assert!(session.history().is_empty());
    assert_eq!(session.last_seen_id(), Some(MessageId::new(1)));
}

#[tokio::test(start_paused = true)]
async fn overlapping_writes_leave_the_newest_state() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new().with_latency(Duration::from_millis(50)));
    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();

    store.seed("bob", "incoming");
    let (first, polled, second) = tokio::join!(
        session.send("outgoing"),
        session.refresh(),
        session.send("second")
    );
    first.unwrap();
    second.unwrap();
    polled.unwrap();

    let on_disk = storage.load_snapshot().unwrap();
    assert_eq!(Some(on_disk.clone()), session.snapshot());
    let own: Vec<_> = on_disk.messages.iter().filter(|e| e.is_own).collect();
    assert_eq!(own.len(), 2);
    assert!(own.iter().all(|e| e.delivery == Delivery::Sent));
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn logout_clears_snapshot_but_remembers_username() {
    let (_dir, storage) = open_storage();
    let store = Arc::new(LoopbackStore::new());
    store.seed("bob", "hi");
    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();
    assert!(storage.load_snapshot().is_some());

    session.logout();
    assert!(storage.load_snapshot().is_none());
    assert_eq!(storage.load_username().as_deref(), Some("alice"));
    assert_eq!(storage.resume_user().as_deref(), Some("alice"));
}

// =============================================================================
// Bad snapshots
// =============================================================================

#[tokio::test(start_paused = true)]
async fn corrupt_snapshot_starts_fresh() {
    let (dir, storage) = open_storage();
    std::fs::write(
        dir.path().join(format!("{KEY_PREFIX}{SNAPSHOT_KEY}.json")),
        b"{ not json",
    )
    .unwrap();

    let store = Arc::new(LoopbackStore::new());
    store.seed("bob", "hi");
    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();

    assert_eq!(session.history().len(), 1);
    // The first applied poll overwrote the corrupt file.
    assert_eq!(storage.load_snapshot().unwrap().current_user, "alice");
}

#[tokio::test(start_paused = true)]
async fn stored_entries_newer_than_last_id_are_dropped() {
    let (_dir, storage) = open_storage();
    storage.save_snapshot(&Snapshot {
        current_user: "alice".to_string(),
        messages: vec![
            stored(4, "bob", "alice"),
            stored(5, "bob", "alice"),
            stored(9, "bob", "alice"),
        ],
        last_message_id: MessageId::new(5),
        online_users: vec!["alice".to_string(), "bob".to_string()],
    });

    let store = Arc::new(LoopbackStore::new());
    let (session, _rx) = session_over(&store, &storage);
    session.start("alice").await.unwrap();

    let ids: Vec<i64> = session
        .history()
        .iter()
        .map(|e| e.message.id.as_i64())
        .collect();
    assert_eq!(ids, vec![4, 5]);
    assert_eq!(session.last_seen_id(), Some(MessageId::new(5)));
}
