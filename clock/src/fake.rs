//! Manually advanced clock for deterministic tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::{DeadlineSignal, TickStream, TimeSource};

#[derive(Debug)]
struct Timer {
    due: Duration,
    kind: TimerKind,
}

#[derive(Debug)]
enum TimerKind {
    Once(oneshot::Sender<()>),
    Every {
        period: Duration,
        tx: mpsc::UnboundedSender<()>,
    },
}

#[derive(Debug)]
struct State {
    /// Virtual time elapsed since construction.
    now: Duration,
    /// Pending timers, in registration order.
    timers: Vec<Timer>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    /// Published count of pending timers, for `wait_for_watchers`.
    watchers: watch::Sender<usize>,
}

/// A [`TimeSource`] that only moves when told to.
///
/// Time starts at zero and advances in explicit jumps via [`advance`]. Every
/// signal handed out by [`after`] and [`every`] registers a *watcher*; a test
/// can await [`wait_for_watchers`] to know the code under test has armed its
/// timers before advancing past them. Clones share the same clock.
///
/// [`advance`]: FakeClock::advance
/// [`after`]: TimeSource::after
/// [`every`]: TimeSource::every
/// [`wait_for_watchers`]: FakeClock::wait_for_watchers
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Inner>,
}

impl FakeClock {
    #[must_use]
    pub fn new() -> Self {
        let (watchers, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    now: Duration::ZERO,
                    timers: Vec::new(),
                }),
                watchers,
            }),
        }
    }

    /// Advance virtual time by `delta`, firing every timer that comes due.
    ///
    /// Timers fire in due-time order (registration order breaks ties), and a
    /// repeating timer fires once per period it covers — advancing 3s past a
    /// 1s ticker queues three ticks. One-shot timers deregister when they
    /// fire; a timer whose receiver has been dropped deregisters instead of
    /// firing.
    pub fn advance(&self, delta: Duration) {
        let mut state = self.lock_state();
        let target = state.now + delta;
        loop {
            let next = state
                .timers
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.due <= target)
                .min_by_key(|(index, timer)| (timer.due, *index))
                .map(|(index, _)| index);
            let Some(index) = next else { break };

            let mut timer = state.timers.remove(index);
            match timer.kind {
                TimerKind::Once(tx) => {
                    tracing::trace!(due = ?timer.due, "fake clock fired one-shot timer");
                    let _ = tx.send(());
                }
                TimerKind::Every { period, ref tx } => {
                    if tx.send(()).is_ok() {
                        tracing::trace!(due = ?timer.due, "fake clock fired repeating timer");
                        timer.due += period;
                        state.timers.insert(index, timer);
                    }
                }
            }
        }
        state.now = target;
        self.publish_watchers(&state);
    }

    /// Number of timers currently waiting on this clock.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.lock_state().timers.len()
    }

    /// Wait until at least `count` timers are registered.
    ///
    /// This is the synchronization point for tests: arm the code under test,
    /// `wait_for_watchers(n)`, then [`advance`](FakeClock::advance) knowing
    /// the timers exist. Returns immediately if the count is already met.
    pub async fn wait_for_watchers(&self, count: usize) {
        let mut rx = self.inner.watchers.subscribe();
        // The sender lives in `inner`, which we hold; wait_for cannot fail.
        let _ = rx.wait_for(|current| *current >= count).await;
    }

    /// Virtual time elapsed since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.lock_state().now
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_watchers(&self, state: &State) {
        self.inner.watchers.send_replace(state.timers.len());
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for FakeClock {
    fn after(&self, duration: Duration) -> DeadlineSignal {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock_state();
        let due = state.now + duration;
        state.timers.push(Timer {
            due,
            kind: TimerKind::Once(tx),
        });
        self.publish_watchers(&state);
        rx
    }

    fn every(&self, interval: Duration) -> TickStream {
        assert!(interval > Duration::ZERO, "tick interval must be non-zero");
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock_state();
        let due = state.now + interval;
        state.timers.push(Timer {
            due,
            kind: TimerKind::Every {
                period: interval,
                tx,
            },
        });
        self.publish_watchers(&state);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn one_shot_fires_only_at_due_time() {
        let clock = FakeClock::new();
        let mut deadline = clock.after(5 * SEC);

        clock.advance(4 * SEC);
        assert!(deadline.try_recv().is_err());

        clock.advance(SEC);
        assert!(deadline.try_recv().is_ok());
    }

    #[tokio::test]
    async fn one_shot_deregisters_after_firing() {
        let clock = FakeClock::new();
        let _deadline = clock.after(SEC);
        assert_eq!(clock.watcher_count(), 1);

        clock.advance(SEC);
        assert_eq!(clock.watcher_count(), 0);
    }

    #[tokio::test]
    async fn repeating_fires_once_per_period() {
        let clock = FakeClock::new();
        let mut ticks = clock.every(SEC);

        clock.advance(3 * SEC);
        for _ in 0..3 {
            assert!(ticks.try_recv().is_ok());
        }
        assert!(ticks.try_recv().is_err());

        // Still registered, still ticking.
        assert_eq!(clock.watcher_count(), 1);
        clock.advance(SEC);
        assert!(ticks.try_recv().is_ok());
    }

    #[tokio::test]
    async fn repeating_does_not_fire_early() {
        let clock = FakeClock::new();
        let mut ticks = clock.every(2 * SEC);

        clock.advance(SEC);
        assert!(ticks.try_recv().is_err());

        clock.advance(SEC);
        assert!(ticks.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_deregisters_on_next_advance() {
        let clock = FakeClock::new();
        let ticks = clock.every(SEC);
        assert_eq!(clock.watcher_count(), 1);

        drop(ticks);
        clock.advance(SEC);
        assert_eq!(clock.watcher_count(), 0);
    }

    #[tokio::test]
    async fn wait_for_watchers_unblocks_on_registration() {
        let clock = FakeClock::new();
        let registrar = clock.clone();
        let register = tokio::spawn(async move {
            tokio::task::yield_now().await;
            registrar.after(SEC)
        });

        clock.wait_for_watchers(1).await;
        assert_eq!(clock.watcher_count(), 1);
        drop(register.await);
    }

    #[tokio::test]
    async fn elapsed_tracks_advances() {
        let clock = FakeClock::new();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        clock.advance(3 * SEC);
        clock.advance(SEC);
        assert_eq!(clock.elapsed(), 4 * SEC);
    }

    #[tokio::test]
    async fn clones_share_the_same_clock() {
        let clock = FakeClock::new();
        let shared = clock.clone();
        let mut deadline = shared.after(SEC);

        clock.advance(SEC);
        assert!(deadline.try_recv().is_ok());
        assert_eq!(shared.elapsed(), SEC);
    }
}
