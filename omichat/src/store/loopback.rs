//! In-process message store.
//!
//! [`LoopbackStore`] behaves like the remote endpoint (assigns increasing ids,
//! returns the full list on every read) without any network. It backs the
//! offline demo mode and lets tests inject failures, rejections and latency.

use std::time::Duration;

use chrono::SecondsFormat;
use parking_lot::Mutex;

use omichat_proto::api::{SendRequest, SendResponse};
use omichat_proto::message::{Message, MessageId};

use super::{RemoteStore, StoreError};

#[derive(Debug, Default)]
struct LoopbackInner {
    messages: Vec<Message>,
    last_id: i64,
    failures_remaining: u32,
    offline: bool,
    reject_writes: bool,
    fetch_count: usize,
    post_count: usize,
    ping_count: usize,
}

/// In-memory store with failure injection.
///
/// # Example
///
/// ```rust,no_run
/// use omichat::store::RemoteStore;
/// use omichat::store::loopback::LoopbackStore;
///
/// # async fn example() {
/// let store = LoopbackStore::new();
/// store.seed("bob", "hello");
/// let feed = store.fetch_messages().await.unwrap();
/// assert_eq!(feed[0].author, "bob");
/// # }
/// ```
#[derive(Debug, Default)]
pub struct LoopbackStore {
    inner: Mutex<LoopbackInner>,
    latency: Option<Duration>,
}

impl LoopbackStore {
    /// Create an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every request by `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a message as if another client had posted it.
    pub fn seed(&self, author: &str, body: &str) -> MessageId {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = MessageId::new(inner.last_id);
        inner.messages.push(Message {
            id,
            author: author.to_string(),
            body: body.to_string(),
            sent_at: now_rfc3339(),
        });
        id
    }

    /// Append a message with an explicit id. Later seeded ids continue above
    /// the highest id present.
    pub fn push_raw(&self, message: Message) {
        let mut inner = self.inner.lock();
        inner.last_id = inner.last_id.max(message.id.as_i64());
        inner.messages.push(message);
    }

    /// Make the next `count` requests fail with a network error.
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().failures_remaining = count;
    }

    /// Make every request fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Answer writes with `success: false` until switched back.
    pub fn set_reject_writes(&self, reject: bool) {
        self.inner.lock().reject_writes = reject;
    }

    /// Number of read requests received.
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetch_count
    }

    /// Number of write requests received.
    pub fn post_count(&self) -> usize {
        self.inner.lock().post_count
    }

    /// Number of pings received.
    pub fn ping_count(&self) -> usize {
        self.inner.lock().ping_count
    }

    /// Copy of everything stored.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Consume one injected failure, if any is pending.
    fn take_failure(inner: &mut LoopbackInner) -> Option<StoreError> {
        if inner.offline {
            return Some(StoreError::Network("loopback store offline".to_string()));
        }
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Some(StoreError::Network("injected failure".to_string()));
        }
        None
    }
}

impl RemoteStore for LoopbackStore {
    async fn fetch_messages(&self) -> Result<Vec<Message>, StoreError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock();
        inner.fetch_count += 1;
        if let Some(err) = Self::take_failure(&mut inner) {
            return Err(err);
        }
        Ok(inner.messages.clone())
    }

    async fn post_message(&self, request: &SendRequest) -> Result<SendResponse, StoreError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock();
        inner.post_count += 1;
        if let Some(err) = Self::take_failure(&mut inner) {
            return Err(err);
        }
        if inner.reject_writes {
            return Ok(SendResponse::default());
        }
        inner.last_id += 1;
        let id = MessageId::new(inner.last_id);
        let timestamp = now_rfc3339();
        inner.messages.push(Message {
            id,
            author: request.user.clone(),
            body: request.message.clone(),
            sent_at: timestamp.clone(),
        });
        drop(inner);
        Ok(SendResponse {
            success: true,
            id: Some(id),
            timestamp: Some(timestamp),
        })
    }

    async fn ping(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.ping_count += 1;
        !inner.offline
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
