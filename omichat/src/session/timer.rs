//! Cancellable repeating timers.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest period a timer accepts.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a background task that runs a callback on a fixed period.
///
/// The first tick fires one period after spawning. Each tick's future is
/// awaited before the next tick is scheduled, so ticks never overlap; a slow
/// tick delays the schedule rather than bunching ticks up. The task stops
/// when the callback returns [`ControlFlow::Break`], on [`cancel`], or when
/// the handle is dropped.
///
/// [`cancel`]: RepeatingTimer::cancel
#[derive(Debug)]
pub struct RepeatingTimer {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl RepeatingTimer {
    /// Spawns a timer on the current tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send,
    {
        let period = period.max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    tracing::debug!(timer = name, "timer stopped by its callback");
                    break;
                }
            }
        });
        tracing::debug!(timer = name, period_ms = period.as_millis(), "timer started");
        Self { name, handle }
    }

    /// Stops the timer. A tick in progress is abandoned at its next await.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            tracing::debug!(timer = self.name, "timer cancelled");
        }
        self.handle.abort();
    }

    /// Whether the timer task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
