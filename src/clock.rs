// Repeating and one-shot timers driven by the tokio clock
//
// Every timer is owned through a `TimerHandle`. Cancelling a handle is
// idempotent, and dropping it cancels the timer, so a handle that goes out
// of scope on an error path cannot leave a timer running.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Timer factory
pub struct Clock;

impl Clock {
    /// Call `tick` every `period`, starting one period from now
    ///
    /// The timer ends when `tick` returns `ControlFlow::Break` or the handle
    /// is cancelled. A tick never runs after cancellation was requested.
    pub fn repeat<F>(period: Duration, mut tick: F) -> TimerHandle
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if cancelled.is_cancelled() || tick().is_break() {
                            break;
                        }
                    }
                }
            }

            debug!("Repeating timer finished");
        });

        TimerHandle { token, task }
    }

    /// Call `fire` once after `delay` unless cancelled first
    pub fn once<F>(delay: Duration, fire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                _ = time::sleep(delay) => fire(),
            }
        });

        TimerHandle { token, task }
    }
}

/// Owner of a running timer
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the timer; calling this more than once has no further effect
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the timer task has exited (fired, broke out, or cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_repeat_runs_until_break() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let handle = Clock::repeat(Duration::from_secs(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_stops_ticks() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let handle = Clock::repeat(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
        handle.cancel();
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_does_not_fire_after_drop() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);

        let handle = Clock::once(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);

        let _handle = Clock::once(Duration::from_secs(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
