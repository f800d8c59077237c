//! Session controller for one logged-in user.
//!
//! A [`Session`] owns the reconciliation and connection state, the remote
//! store handle, local storage, and two [`RepeatingTimer`]s: the sync loop
//! (poll every `poll_interval`) and presence pruning (every
//! `prune_interval`). Logging out cancels both timers and discards the state.
//!
//! All state mutation happens in short synchronous sections behind a
//! [`parking_lot::Mutex`]; the lock is never held across an `.await`, so a
//! poll result and a send result are each applied atomically. Network calls
//! run without the lock held. Every active session carries a token; results
//! that come back after the token changed (logout, re-login) are dropped.
//!
//! The presentation layer learns about changes through [`SessionEvent`]s,
//! delivered fire-and-forget on an mpsc channel.

mod send;
mod sync;
pub mod timer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use omichat_proto::message::{MAX_USERNAME_LEN, MessageId, ValidationError, validate_username};
use omichat_proto::snapshot::{Delivery, HistoryEntry, SNAPSHOT_MESSAGE_LIMIT, Snapshot};

use crate::chat::connection::{ConnectionState, DEFAULT_MAX_RETRIES, SyncStatus};
use crate::chat::history::DEFAULT_HISTORY_CAPACITY;
use crate::chat::presence::DEFAULT_PRESENCE_KEEP;
use crate::chat::state::ReconciliationState;
use crate::export::{self, ExportError};
use crate::storage::LocalStorage;
use crate::store::RemoteStore;

pub use send::SendError;
pub use sync::PollOutcome;
use timer::RepeatingTimer;

/// Default session identifier sent with every write.
pub const DEFAULT_SESSION_ID: &str = "omichat_v0.3";

/// Default client version sent with every write.
pub const DEFAULT_CLIENT_VERSION: &str = "0.3";

/// Default buffer size of the session event channel.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The username was rejected.
    #[error("invalid username: {0}")]
    Validation(#[from] ValidationError),

    /// `start` was called while a user is logged in.
    #[error("already logged in as {0}")]
    AlreadyActive(String),

    /// The operation needs a logged-in user.
    #[error("no active session")]
    NotActive,
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between automatic polls.
    pub poll_interval: Duration,
    /// Consecutive failed polls before the sync loop halts.
    pub max_retries: u32,
    /// Delay between presence prunes.
    pub prune_interval: Duration,
    /// Non-self senders kept by pruning.
    pub presence_keep: usize,
    /// Maximum history length.
    pub history_capacity: usize,
    /// Maximum entries persisted in a snapshot.
    pub snapshot_limit: usize,
    /// Session identifier sent with writes.
    pub session_id: String,
    /// Client version sent with writes and shown in exports.
    pub client_version: String,
    /// Maximum username length in characters.
    pub max_username_len: usize,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_retries: DEFAULT_MAX_RETRIES,
            prune_interval: Duration::from_secs(60),
            presence_keep: DEFAULT_PRESENCE_KEEP,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            snapshot_limit: SNAPSHOT_MESSAGE_LIMIT,
            session_id: DEFAULT_SESSION_ID.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            max_username_len: MAX_USERNAME_LEN,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user logged in. Carries whatever was restored from the snapshot.
    Started {
        /// The logged-in user.
        user: String,
        /// Restored history, oldest first.
        history: Vec<HistoryEntry>,
        /// Restored online users, local user first.
        online_users: Vec<String>,
    },
    /// Result of the connectivity check run at login.
    PingCompleted {
        /// Whether the store answered with a success status.
        reachable: bool,
    },
    /// New messages were fetched and appended, oldest first.
    MessagesApplied(Vec<HistoryEntry>),
    /// An outgoing message was echoed locally.
    Echoed(HistoryEntry),
    /// A local echo changed delivery state.
    DeliveryChanged {
        /// Temporary id of the echo.
        id: MessageId,
        /// New state.
        delivery: Delivery,
    },
    /// The sync loop's connection status changed.
    StatusChanged(SyncStatus),
    /// The online-user list changed.
    PresenceChanged(Vec<String>),
    /// The unread counter changed.
    UnreadChanged(u32),
    /// Local history was cleared.
    HistoryCleared,
    /// The user logged out.
    LoggedOut,
}

/// Point-in-time summary of a session, for the settings view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Client version.
    pub version: String,
    /// Logged-in user.
    pub user: String,
    /// Entries in local history.
    pub message_count: usize,
    /// Known online users, including the local user.
    pub online_count: usize,
    /// Where the remote store lives.
    pub endpoint: String,
    /// Delay between automatic polls.
    pub poll_interval: Duration,
    /// Maximum history length.
    pub history_capacity: usize,
    /// Whether the last poll succeeded.
    pub connected: bool,
    /// Whether the sync loop has halted.
    pub halted: bool,
    /// Consecutive failed polls.
    pub consecutive_failures: u32,
    /// Failures allowed before halting.
    pub max_retries: u32,
    /// Highest store id seen.
    pub last_seen_id: MessageId,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.halted {
            "disconnected"
        } else if self.connected {
            "connected"
        } else {
            "connecting"
        };
        writeln!(f, "OMI Chat v{}", self.version)?;
        writeln!(f, "User: {}", self.user)?;
        writeln!(f, "Messages: {}", self.message_count)?;
        writeln!(f, "Online: {}", self.online_count)?;
        writeln!(f, "Endpoint: {}", self.endpoint)?;
        writeln!(f, "Poll interval: {} s", self.poll_interval.as_secs_f64())?;
        writeln!(f, "History capacity: {}", self.history_capacity)?;
        writeln!(f, "Last seen id: {}", self.last_seen_id)?;
        writeln!(f, "Status: {status}")?;
        write!(
            f,
            "Reconnect attempts: {}/{}",
            self.consecutive_failures, self.max_retries
        )
    }
}

/// State of the logged-in user.
#[derive(Debug)]
struct Active {
    user: String,
    token: Uuid,
    recon: ReconciliationState,
    conn: ConnectionState,
    /// Messages applied while in the background.
    unread: u32,
    /// Last status reported to the presentation layer.
    reported_status: Option<SyncStatus>,
}

impl Active {
    /// Returns `status` if it differs from what was last reported.
    fn status_change(&mut self, status: SyncStatus) -> Option<SyncStatus> {
        if self.reported_status == Some(status) {
            return None;
        }
        self.reported_status = Some(status);
        Some(status)
    }
}

/// A snapshot tagged with the order in which it was taken.
struct Stamped {
    seq: u64,
    snapshot: Snapshot,
}

/// State shared with timer tasks.
struct Inner<S> {
    store: S,
    storage: Option<LocalStorage>,
    config: SessionConfig,
    state: Mutex<Option<Active>>,
    /// Source of [`Stamped::seq`]. Only advanced while `state` is locked.
    snapshot_seq: AtomicU64,
    /// Sequence number of the last snapshot written or cleared.
    persisted_seq: Mutex<u64>,
    foreground: AtomicBool,
    poll_in_flight: AtomicBool,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl<S> Inner<S> {
    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    tracing::warn!(?event, "session event channel full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn next_seq(&self) -> u64 {
        self.snapshot_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Takes a snapshot of `active`. Call with the state lock held so the
    /// sequence number matches the order of state changes.
    fn stamp(&self, active: &Active) -> Stamped {
        Stamped {
            seq: self.next_seq(),
            snapshot: active.recon.snapshot(self.config.snapshot_limit),
        }
    }

    /// Writes `stamped` unless a newer snapshot already reached storage.
    fn persist(&self, stamped: Stamped) {
        let Some(storage) = &self.storage else {
            return;
        };
        let mut persisted = self.persisted_seq.lock();
        if stamped.seq <= *persisted {
            tracing::trace!(seq = stamped.seq, "skipping stale snapshot");
            return;
        }
        storage.save_snapshot(&stamped.snapshot);
        *persisted = stamped.seq;
    }

    /// Deletes the persisted snapshot and fences out snapshots taken before.
    fn clear_persisted(&self, seq: u64) {
        let Some(storage) = &self.storage else {
            return;
        };
        let mut persisted = self.persisted_seq.lock();
        storage.clear_snapshot();
        *persisted = (*persisted).max(seq);
    }

    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    fn token(&self) -> Option<Uuid> {
        self.state.lock().as_ref().map(|a| a.token)
    }

    /// Runs `f` on the active state if its token still matches.
    fn with_session<R>(&self, token: Uuid, f: impl FnOnce(&mut Active) -> R) -> Option<R> {
        let mut state = self.state.lock();
        match state.as_mut() {
            Some(active) if active.token == token => Some(f(active)),
            _ => None,
        }
    }

    /// Runs `f` on the active state, whatever its token.
    fn with_active<R>(&self, f: impl FnOnce(&mut Active) -> R) -> Option<R> {
        self.state.lock().as_mut().map(f)
    }
}

#[derive(Debug, Default)]
struct Timers {
    sync: Option<RepeatingTimer>,
    prune: Option<RepeatingTimer>,
}

/// Chat session over a [`RemoteStore`].
///
/// # Example
///
/// ```rust,no_run
/// use omichat::session::{Session, SessionConfig};
/// use omichat::store::loopback::LoopbackStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (session, mut events) = Session::new(LoopbackStore::new(), None, SessionConfig::default());
/// session.start("alice").await?;
/// session.send("hello").await?;
/// while let Ok(event) = events.try_recv() {
///     println!("{event:?}");
/// }
/// session.logout();
/// # Ok(())
/// # }
/// ```
pub struct Session<S: RemoteStore + 'static> {
    inner: Arc<Inner<S>>,
    timers: Mutex<Timers>,
}

impl<S: RemoteStore + 'static> Session<S> {
    /// Creates a logged-out session.
    ///
    /// Returns the session and the receiver for its [`SessionEvent`]s. The
    /// session starts in the foreground.
    pub fn new(
        store: S,
        storage: Option<LocalStorage>,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let inner = Inner {
            store,
            storage,
            config,
            state: Mutex::new(None),
            snapshot_seq: AtomicU64::new(0),
            persisted_seq: Mutex::new(0),
            foreground: AtomicBool::new(true),
            poll_in_flight: AtomicBool::new(false),
            event_tx,
        };
        let session = Self {
            inner: Arc::new(inner),
            timers: Mutex::new(Timers::default()),
        };
        (session, event_rx)
    }

    /// Logs in as `raw_user`.
    ///
    /// Validates and persists the username, restores the snapshot if it
    /// belongs to the same user, checks connectivity, runs the first poll and
    /// starts the pruning timer. The sync timer starts too unless the first
    /// poll already exhausted the retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for a bad username and
    /// [`SessionError::AlreadyActive`] if a user is already logged in.
    pub async fn start(&self, raw_user: &str) -> Result<(), SessionError> {
        let config = &self.inner.config;
        let user = validate_username(raw_user, config.max_username_len)?;

        let restored = self
            .inner
            .storage
            .as_ref()
            .and_then(LocalStorage::load_snapshot)
            .filter(|s| s.current_user == user);
        let recon = match restored {
            Some(snapshot) => {
                tracing::info!(
                    user = %user,
                    messages = snapshot.messages.len(),
                    last_id = %snapshot.last_message_id,
                    "restoring snapshot"
                );
                ReconciliationState::from_snapshot(snapshot, &user, config.history_capacity)
            }
            None => ReconciliationState::new(&user, config.history_capacity),
        };
        let started = SessionEvent::Started {
            user: user.clone(),
            history: recon.history().iter().cloned().collect(),
            online_users: recon.online_users(),
        };

        {
            let mut state = self.inner.state.lock();
            if let Some(active) = state.as_ref() {
                return Err(SessionError::AlreadyActive(active.user.clone()));
            }
            *state = Some(Active {
                user: user.clone(),
                token: Uuid::now_v7(),
                recon,
                conn: ConnectionState::new(config.max_retries),
                unread: 0,
                reported_status: None,
            });
        }
        if let Some(storage) = &self.inner.storage {
            storage.save_username(&user);
        }
        tracing::info!(user = %user, store = %self.inner.store.describe(), "session started");
        self.inner.emit(started);

        let reachable = self.inner.store.ping().await;
        if reachable {
            tracing::debug!("store reachable");
        } else {
            tracing::warn!("store unreachable at login");
        }
        self.inner.emit(SessionEvent::PingCompleted { reachable });

        self.inner.poll_once().await;

        if self.inner.token().is_some() {
            self.timers.lock().prune = Some(self.spawn_prune_timer());
            self.ensure_sync_timer();
        }
        Ok(())
    }

    /// Manual refresh.
    ///
    /// Clears the failure and unread counters, polls immediately, and
    /// restarts the sync loop if it had halted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotActive`] if nobody is logged in.
    pub async fn refresh(&self) -> Result<PollOutcome, SessionError> {
        let cleared = self
            .inner
            .with_active(|active| {
                active.conn.reset_failures();
                std::mem::take(&mut active.unread) > 0
            })
            .ok_or(SessionError::NotActive)?;
        if cleared {
            self.inner.emit(SessionEvent::UnreadChanged(0));
        }
        tracing::debug!("manual refresh");
        let outcome = self.inner.poll_once().await;
        self.ensure_sync_timer();
        Ok(outcome)
    }

    /// Sets foreground visibility.
    ///
    /// While backgrounded, timer ticks skip polling. Returning to the
    /// foreground clears the unread counter and polls immediately unless the
    /// sync loop has halted.
    pub async fn set_foreground(&self, visible: bool) {
        if self.set_visibility(visible) {
            self.inner.poll_once().await;
        }
    }

    /// Applies a visibility change without polling.
    ///
    /// Changes are applied in call order. Returns `true` when the session
    /// just came back to the foreground and a catch-up poll should follow
    /// (see [`Session::poll_now`]).
    pub fn set_visibility(&self, visible: bool) -> bool {
        let was_visible = self.inner.foreground.swap(visible, Ordering::AcqRel);
        if !visible || was_visible {
            return false;
        }
        let Some((cleared, halted)) = self.inner.with_active(|active| {
            (
                std::mem::take(&mut active.unread) > 0,
                active.conn.is_halted(),
            )
        }) else {
            return false;
        };
        if cleared {
            self.inner.emit(SessionEvent::UnreadChanged(0));
        }
        !halted
    }

    /// Polls once without touching the failure or unread counters.
    pub async fn poll_now(&self) -> PollOutcome {
        self.inner.poll_once().await
    }

    /// Whether the session is in the foreground.
    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.inner.is_foreground()
    }

    /// Prunes the online-user list now. Returns the users that were dropped.
    pub fn prune_presence(&self) -> Vec<String> {
        self.inner.prune_presence()
    }

    /// Empties local history. The remote store is untouched and messages
    /// already seen are not fetched again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotActive`] if nobody is logged in.
    pub fn clear_local_history(&self) -> Result<(), SessionError> {
        let stamped = self
            .inner
            .with_active(|active| {
                active.recon.clear_history();
                self.inner.stamp(active)
            })
            .ok_or(SessionError::NotActive)?;
        self.inner.persist(stamped);
        tracing::info!("local history cleared");
        self.inner.emit(SessionEvent::HistoryCleared);
        Ok(())
    }

    /// Writes the history to a text file in `dir` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NotActive`] if nobody is logged in,
    /// [`ExportError::Empty`] if there is no history, or
    /// [`ExportError::Io`] if the file cannot be written.
    pub fn export(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let (user, entries) = self
            .inner
            .with_active(|active| {
                (
                    active.user.clone(),
                    active.recon.history().iter().cloned().collect::<Vec<_>>(),
                )
            })
            .ok_or(ExportError::NotActive)?;
        export::write_export(dir, &self.inner.config.client_version, &user, &entries)
    }

    /// Summary for the settings view, or `None` if nobody is logged in.
    #[must_use]
    pub fn settings(&self) -> Option<SessionSummary> {
        let config = &self.inner.config;
        let endpoint = self.inner.store.describe();
        self.inner.with_active(|active| SessionSummary {
            version: config.client_version.clone(),
            user: active.user.clone(),
            message_count: active.recon.history().len(),
            online_count: active.recon.online_users().len(),
            endpoint,
            poll_interval: config.poll_interval,
            history_capacity: active.recon.history().capacity(),
            connected: active.conn.is_connected(),
            halted: active.conn.is_halted(),
            consecutive_failures: active.conn.consecutive_failures(),
            max_retries: active.conn.max_retries(),
            last_seen_id: active.recon.last_seen_id(),
        })
    }

    /// Logs out: cancels both timers, drops the state so in-flight results
    /// are discarded, and clears the persisted snapshot.
    ///
    /// Returns the user that was logged out, if any.
    pub fn logout(&self) -> Option<String> {
        {
            let mut timers = self.timers.lock();
            for timer in [timers.sync.take(), timers.prune.take()].into_iter().flatten() {
                timer.cancel();
            }
        }
        let (active, seq) = {
            let mut state = self.inner.state.lock();
            let active = state.take()?;
            (active, self.inner.next_seq())
        };
        self.inner.clear_persisted(seq);
        tracing::info!(user = %active.user, "logged out");
        self.inner.emit(SessionEvent::LoggedOut);
        Some(active.user)
    }

    /// Logged-in user.
    #[must_use]
    pub fn user(&self) -> Option<String> {
        self.inner.with_active(|active| active.user.clone())
    }

    /// Whether a user is logged in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.token().is_some()
    }

    /// Copy of the local history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner
            .with_active(|active| active.recon.history().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Known online users, local user first.
    #[must_use]
    pub fn online_users(&self) -> Vec<String> {
        self.inner
            .with_active(|active| active.recon.online_users())
            .unwrap_or_default()
    }

    /// Highest store id seen.
    #[must_use]
    pub fn last_seen_id(&self) -> Option<MessageId> {
        self.inner.with_active(|active| active.recon.last_seen_id())
    }

    /// Messages applied while backgrounded.
    #[must_use]
    pub fn unread(&self) -> u32 {
        self.inner.with_active(|active| active.unread).unwrap_or(0)
    }

    /// Whether the sync loop has halted after too many failures.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner
            .with_active(|active| active.conn.is_halted())
            .unwrap_or(false)
    }

    /// Whether the sync timer is currently scheduled.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.timers
            .lock()
            .sync
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Current persisted-form snapshot, or `None` if nobody is logged in.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        let limit = self.inner.config.snapshot_limit;
        self.inner.with_active(|active| active.recon.snapshot(limit))
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Restarts the sync timer if it stopped and the loop may run again.
    fn ensure_sync_timer(&self) {
        let runnable = self
            .inner
            .with_active(|active| !active.conn.is_halted())
            .unwrap_or(false);
        if !runnable {
            return;
        }
        let mut timers = self.timers.lock();
        if timers.sync.as_ref().is_none_or(RepeatingTimer::is_finished) {
            tracing::info!("resuming sync loop");
            timers.sync = Some(self.spawn_sync_timer());
        }
    }

    fn spawn_sync_timer(&self) -> RepeatingTimer {
        let inner = Arc::clone(&self.inner);
        RepeatingTimer::spawn("sync", self.inner.config.poll_interval, move || {
            let inner = Arc::clone(&inner);
            async move { inner.sync_tick().await }
        })
    }

    fn spawn_prune_timer(&self) -> RepeatingTimer {
        let inner = Arc::clone(&self.inner);
        RepeatingTimer::spawn("prune", self.inner.config.prune_interval, move || {
            let inner = Arc::clone(&inner);
            async move { inner.prune_tick() }
        })
    }
}

impl<S: RemoteStore + 'static> Drop for Session<S> {
    fn drop(&mut self) {
        let mut timers = self.timers.lock();
        timers.sync.take();
        timers.prune.take();
    }
}
