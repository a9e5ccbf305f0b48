//! Pluggable time sources.
//!
//! Components that wait on time never touch `tokio::time` directly; they ask
//! a [`TimeSource`] for signals and `select!` over the receiving halves.
//! [`SystemClock`] backs those signals with real timers, [`FakeClock`] with a
//! virtual clock a test advances by hand, so time-dependent behaviour can be
//! exercised deterministically and without sleeping.

mod fake;

pub use fake::FakeClock;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

/// One-shot signal that resolves when a deadline is reached.
///
/// Resolves with `Err` if the time source is dropped first; callers that
/// treat any resolution as "deadline passed" remain correct either way.
pub type DeadlineSignal = oneshot::Receiver<()>;

/// Stream of tick signals from a repeating timer.
///
/// Unbounded so a producer can never stall behind a slow consumer; ticks
/// queue until the consumer drains them, one `recv` per tick.
pub type TickStream = mpsc::UnboundedReceiver<()>;

/// A source of timed events: one-shot deadlines and repeating ticks.
///
/// Both methods hand back the receiving half of a channel, so consumers can
/// multiplex deadlines against ticks (and anything else) with
/// `tokio::select!` without caring whether time is real or virtual.
pub trait TimeSource {
    /// One-shot signal that fires once `duration` has elapsed.
    fn after(&self, duration: Duration) -> DeadlineSignal;

    /// Repeating signal firing every `interval`, the first firing one full
    /// interval from now — never immediately.
    fn every(&self, interval: Duration) -> TickStream;
}

/// Wall-clock [`TimeSource`] backed by tokio timers.
///
/// Each signal is driven by a spawned task, so both methods must be called
/// from within a tokio runtime. Producer tasks exit once the receiving half
/// is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn after(&self, duration: Duration) -> DeadlineSignal {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Receiver may be gone if the caller stopped waiting; that is
            // its business, not an error here.
            let _ = tx.send(());
        });
        rx
    }

    fn every(&self, interval: Duration) -> TickStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut timer = tokio::time::interval_at(start, interval);
            loop {
                timer.tick().await;
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn after_fires_once() {
        let clock = SystemClock;
        let deadline = clock.after(SHORT);
        assert!(deadline.await.is_ok());
    }

    #[tokio::test]
    async fn every_keeps_firing() {
        let clock = SystemClock;
        let mut ticks = clock.every(SHORT);
        for _ in 0..3 {
            assert!(ticks.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn every_does_not_fire_immediately() {
        let clock = SystemClock;
        let mut ticks = clock.every(Duration::from_secs(60));
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test]
    async fn producer_stops_after_receiver_dropped() {
        let clock = SystemClock;
        let ticks = clock.every(Duration::from_millis(1));
        drop(ticks);
        // Nothing to assert directly; the producer task observes the closed
        // channel on its next tick and exits rather than spinning forever.
        tokio::time::sleep(SHORT).await;
    }
}
