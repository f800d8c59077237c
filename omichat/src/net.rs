//! Coordinator wiring the TUI to the async session.
//!
//! This module bridges the synchronous TUI event loop (crossterm poll-based)
//! with the async [`Session`]. It spawns background tokio tasks and
//! communicates with the main thread via [`NetCommand`] / [`NetEvent`]
//! channels.
//!
//! # Architecture
//!
//! ```text
//! TUI (main thread)  ←── NetEvent ───  tokio background tasks
//!                     ─── NetCommand →
//! ```
//!
//! The main thread sends [`NetCommand`]s (e.g., send a message) and drains
//! [`NetEvent`]s (e.g., messages applied, status changed) on each tick of
//! the poll-based event loop. Commands that wait on the network run in their
//! own task so a slow request never holds up the next command.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::{PollOutcome, Session, SessionConfig, SessionEvent};
use crate::storage::LocalStorage;
use crate::store::RemoteStore;

/// Commands sent from the TUI main loop to the background tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCommand {
    /// Log in as a user.
    Login {
        /// Username as typed.
        user: String,
    },
    /// Send a text message.
    SendMessage {
        /// The message text to send.
        text: String,
    },
    /// Poll now and resume a halted sync loop.
    Refresh,
    /// The terminal gained (`true`) or lost (`false`) focus.
    SetForeground(bool),
    /// Empty local history.
    ClearHistory,
    /// Write history to the export directory.
    Export,
    /// Report the session summary.
    Settings,
    /// Log out and forget the persisted snapshot.
    Logout,
    /// Gracefully shut down the background tasks.
    Shutdown,
}

/// Events sent from the background tasks to the TUI main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A session notification.
    Session(SessionEvent),
    /// Login failed; the prompt should stay up.
    LoginFailed(String),
    /// A send did not go through.
    SendFailed(String),
    /// Informational text for the user (export path, settings, refresh).
    Notice(String),
    /// An operation failed.
    Error(String),
}

/// Configuration for the networking layer.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Session tunables.
    pub session: SessionConfig,
    /// Where `/export` writes files.
    pub export_dir: PathBuf,
    /// Channel capacity for command/event mpsc channels.
    pub channel_capacity: usize,
}

/// Default channel capacity for commands and events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl NetConfig {
    /// Creates a `NetConfig` with the default channel capacity.
    #[must_use]
    pub const fn new(session: SessionConfig, export_dir: PathBuf) -> Self {
        Self {
            session,
            export_dir,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the background tasks for a session over `store` and return channel
/// handles.
///
/// Spawns:
///
/// 1. A **command handler** that listens for [`NetCommand`]s and drives the
///    [`Session`].
/// 2. A **session event forwarder** that wraps [`SessionEvent`]s as
///    [`NetEvent::Session`].
///
/// Must be called from within a tokio runtime. Dropping the command sender,
/// or sending [`NetCommand::Shutdown`], stops the tasks; the persisted
/// snapshot is left in place.
pub fn spawn_session<S: RemoteStore + 'static>(
    store: S,
    storage: Option<LocalStorage>,
    config: NetConfig,
) -> (mpsc::Sender<NetCommand>, mpsc::Receiver<NetEvent>) {
    let capacity = config.channel_capacity.max(1);
    let (session, session_rx) = Session::new(store, storage, config.session);
    let session = Arc::new(session);

    let (cmd_tx, cmd_rx) = mpsc::channel::<NetCommand>(capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<NetEvent>(capacity);

    let fwd_tx = evt_tx.clone();
    tokio::spawn(async move {
        session_event_forwarder(session_rx, fwd_tx).await;
    });

    tokio::spawn(async move {
        command_handler(session, cmd_rx, evt_tx, config.export_dir).await;
    });

    (cmd_tx, evt_rx)
}

/// Background task: handle commands from the TUI main loop.
async fn command_handler<S: RemoteStore + 'static>(
    session: Arc<Session<S>>,
    mut cmd_rx: mpsc::Receiver<NetCommand>,
    evt_tx: mpsc::Sender<NetEvent>,
    export_dir: PathBuf,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        tracing::trace!(?cmd, "net command");
        match cmd {
            NetCommand::Login { user } => {
                let session = Arc::clone(&session);
                let evt_tx = evt_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.start(&user).await {
                        let _ = evt_tx.send(NetEvent::LoginFailed(e.to_string())).await;
                    }
                });
            }
            NetCommand::SendMessage { text } => {
                let session = Arc::clone(&session);
                let evt_tx = evt_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.send(&text).await {
                        let _ = evt_tx.send(NetEvent::SendFailed(e.to_string())).await;
                    }
                });
            }
            NetCommand::Refresh => {
                let session = Arc::clone(&session);
                let evt_tx = evt_tx.clone();
                tokio::spawn(async move {
                    let event = match session.refresh().await {
                        Ok(PollOutcome::Synced { applied: 0 }) => {
                            NetEvent::Notice("No new messages".to_string())
                        }
                        Ok(PollOutcome::Synced { applied }) => {
                            NetEvent::Notice(format!("{applied} new message(s)"))
                        }
                        Ok(PollOutcome::Failed(status)) => {
                            NetEvent::Error(format!("Refresh failed: {status}"))
                        }
                        Ok(PollOutcome::Skipped | PollOutcome::Inactive) => return,
                        Err(e) => NetEvent::Error(e.to_string()),
                    };
                    let _ = evt_tx.send(event).await;
                });
            }
            NetCommand::SetForeground(visible) => {
                // Visibility flips in command order; only the catch-up poll
                // runs in the background.
                if session.set_visibility(visible) {
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        session.poll_now().await;
                    });
                }
            }
            NetCommand::ClearHistory => {
                let event = match session.clear_local_history() {
                    Ok(()) => NetEvent::Notice("Local history cleared".to_string()),
                    Err(e) => NetEvent::Error(e.to_string()),
                };
                let _ = evt_tx.send(event).await;
            }
            NetCommand::Export => {
                let event = match session.export(&export_dir) {
                    Ok(path) => NetEvent::Notice(format!("Exported to {}", path.display())),
                    Err(e) => NetEvent::Error(format!("Export failed: {e}")),
                };
                let _ = evt_tx.send(event).await;
            }
            NetCommand::Settings => {
                let event = session.settings().map_or_else(
                    || NetEvent::Error("Not logged in".to_string()),
                    |summary| NetEvent::Notice(summary.to_string()),
                );
                let _ = evt_tx.send(event).await;
            }
            NetCommand::Logout => {
                session.logout();
            }
            NetCommand::Shutdown => {
                tracing::info!("net command handler shutting down");
                break;
            }
        }
    }
}

/// Background task: forward `SessionEvent`s as `NetEvent`s to the TUI.
async fn session_event_forwarder(
    mut session_rx: mpsc::Receiver<SessionEvent>,
    evt_tx: mpsc::Sender<NetEvent>,
) {
    while let Some(event) = session_rx.recv().await {
        if evt_tx.send(NetEvent::Session(event)).await.is_err() {
            // TUI dropped; exit.
            break;
        }
    }
}
