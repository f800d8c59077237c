//! Sync loop and presence pruning for [`Session`](super::Session).

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use omichat_proto::message::Message;

use crate::chat::connection::SyncStatus;
use crate::store::{RemoteStore, StoreError};

use super::{Inner, SessionEvent};

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The fetch succeeded and `applied` new messages were merged.
    Synced {
        /// Number of messages appended to history.
        applied: usize,
    },
    /// The fetch failed; carries the resulting loop status.
    Failed(SyncStatus),
    /// Another poll was still in flight, so this one did nothing.
    Skipped,
    /// Nobody is logged in, or the session ended while the request was out.
    Inactive,
}

/// Clears the in-flight flag when a poll finishes or is abandoned.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: RemoteStore> Inner<S> {
    /// One sync-timer tick.
    ///
    /// Skips the network entirely while backgrounded, and stops the timer
    /// once the session is gone or the loop has halted.
    pub(super) async fn sync_tick(&self) -> ControlFlow<()> {
        match self.with_active(|active| active.conn.is_halted()) {
            None | Some(true) => return ControlFlow::Break(()),
            Some(false) => {}
        }
        if !self.is_foreground() {
            tracing::trace!("backgrounded, skipping poll");
            return ControlFlow::Continue(());
        }
        match self.poll_once().await {
            PollOutcome::Inactive | PollOutcome::Failed(SyncStatus::Halted) => {
                ControlFlow::Break(())
            }
            PollOutcome::Synced { .. } | PollOutcome::Failed(_) | PollOutcome::Skipped => {
                ControlFlow::Continue(())
            }
        }
    }

    /// Fetches the full feed and merges it.
    ///
    /// At most one poll runs at a time; a concurrent call returns
    /// [`PollOutcome::Skipped`] without touching the network.
    pub(super) async fn poll_once(&self) -> PollOutcome {
        let Some(token) = self.token() else {
            return PollOutcome::Inactive;
        };
        let Some(_in_flight) = InFlight::acquire(&self.poll_in_flight) else {
            tracing::debug!("poll already in flight, skipping");
            return PollOutcome::Skipped;
        };
        let result = self.store.fetch_messages().await;
        self.apply_poll_result(token, result)
    }

    fn apply_poll_result(
        &self,
        token: Uuid,
        result: Result<Vec<Message>, StoreError>,
    ) -> PollOutcome {
        let foreground = self.is_foreground();
        let mut events = Vec::new();

        let outcome = self.with_session(token, |active| match result {
            Ok(feed) => {
                let fetched = feed.len();
                let applied = active.recon.apply_feed(feed);
                let count = applied.entries.len();
                let stamped = if count > 0 {
                    tracing::debug!(
                        fetched,
                        applied = count,
                        last_id = %active.recon.last_seen_id(),
                        "applied new messages"
                    );
                    if !foreground {
                        let added = u32::try_from(count).unwrap_or(u32::MAX);
                        active.unread = active.unread.saturating_add(added);
                        events.push(SessionEvent::UnreadChanged(active.unread));
                    }
                    events.push(SessionEvent::MessagesApplied(applied.entries));
                    if applied.presence_changed {
                        events.push(SessionEvent::PresenceChanged(active.recon.online_users()));
                    }
                    Some(self.stamp(active))
                } else {
                    None
                };
                let status = active.conn.record_success();
                if let Some(status) = active.status_change(status) {
                    tracing::info!(%status, "sync status");
                    events.push(SessionEvent::StatusChanged(status));
                }
                (PollOutcome::Synced { applied: count }, stamped)
            }
            Err(e) => {
                let status = active.conn.record_failure();
                tracing::warn!(
                    error = %e,
                    failures = active.conn.consecutive_failures(),
                    max = active.conn.max_retries(),
                    "poll failed"
                );
                if status == SyncStatus::Halted {
                    tracing::error!("sync loop halted after repeated failures; refresh to retry");
                }
                if let Some(status) = active.status_change(status) {
                    events.push(SessionEvent::StatusChanged(status));
                }
                (PollOutcome::Failed(status), None)
            }
        });

        let Some((outcome, stamped)) = outcome else {
            tracing::debug!("discarding poll result for an ended session");
            return PollOutcome::Inactive;
        };
        if let Some(stamped) = stamped {
            self.persist(stamped);
        }
        self.emit_all(events);
        outcome
    }

    /// One pruning-timer tick. Stops once the session is gone.
    pub(super) fn prune_tick(&self) -> ControlFlow<()> {
        if self.token().is_none() {
            return ControlFlow::Break(());
        }
        self.prune_presence();
        ControlFlow::Continue(())
    }

    /// Shrinks the online-user list, returning dropped users.
    pub(super) fn prune_presence(&self) -> Vec<String> {
        let keep = self.config.presence_keep;
        let Some((dropped, users)) = self.with_active(|active| {
            let dropped = active.recon.prune_presence(keep);
            (dropped, active.recon.online_users())
        }) else {
            return Vec::new();
        };
        if !dropped.is_empty() {
            tracing::debug!(?dropped, "pruned online users");
            self.emit(SessionEvent::PresenceChanged(users));
        }
        dropped
    }
}
