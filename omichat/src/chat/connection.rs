//! Connection health as seen by the sync loop.

/// Default number of consecutive failed polls before the loop halts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Where the sync loop stands after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The last poll succeeded.
    Connected,
    /// The last poll failed; the loop keeps polling.
    Reconnecting {
        /// Consecutive failures so far.
        attempt: u32,
        /// Failures allowed before halting.
        max_attempts: u32,
    },
    /// Too many consecutive failures; automatic polling has stopped until a
    /// manual refresh.
    Halted,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting ({attempt}/{max_attempts})"),
            Self::Halted => write!(f, "connection lost"),
        }
    }
}

/// Consecutive-failure counter.
///
/// `connected` is false once `consecutive_failures >= max_retries`, and a
/// successful poll resets the counter regardless of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    consecutive_failures: u32,
    connected: bool,
    max_retries: u32,
}

impl ConnectionState {
    /// Fresh state: not yet connected, no failures. A zero limit is raised
    /// to one.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            consecutive_failures: 0,
            connected: false,
            max_retries: max_retries.max(1),
        }
    }

    /// Records a successful poll.
    pub const fn record_success(&mut self) -> SyncStatus {
        self.consecutive_failures = 0;
        self.connected = true;
        SyncStatus::Connected
    }

    /// Records a failed poll and reports whether the loop may continue.
    pub const fn record_failure(&mut self) -> SyncStatus {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.max_retries {
            self.connected = false;
            SyncStatus::Halted
        } else {
            SyncStatus::Reconnecting {
                attempt: self.consecutive_failures,
                max_attempts: self.max_retries,
            }
        }
    }

    /// Clears the failure counter ahead of a manual refresh.
    pub const fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Whether the loop has given up.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.consecutive_failures >= self.max_retries
    }

    /// Whether the last poll succeeded and the loop has not halted since.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Consecutive failures so far.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Failures allowed before halting.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}
