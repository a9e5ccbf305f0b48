//! Cancellable polling loop with an overall deadline.
//!
//! A [`Poller`] invokes a probe once per tick until the probe succeeds, the
//! probe aborts, or the deadline elapses. Time comes from a pluggable
//! [`TimeSource`], so the same loop runs against the wall clock in
//! production and against a [`FakeClock`](tandem_clock::FakeClock) in tests.

use std::time::Duration;

use thiserror::Error;

use tandem_clock::{SystemClock, TimeSource};

/// Why a probe attempt did not succeed.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Transient failure. The poller logs the cause, discards it, and tries
    /// again on the next tick.
    #[error("transient probe failure: {0}")]
    Retry(anyhow::Error),
    /// Fatal failure. The poller stops immediately and surfaces the cause as
    /// [`PollOutcome::ProbeError`].
    #[error("fatal probe failure: {0}")]
    Abort(anyhow::Error),
}

/// Terminal result of a poll run.
#[derive(Debug)]
pub enum PollOutcome {
    /// The probe reported success before the deadline.
    Success,
    /// The deadline elapsed before any attempt succeeded. Causes of the
    /// failed attempts along the way are not retained.
    Timeout,
    /// The probe reported a fatal failure; retrying was pointless.
    ProbeError(anyhow::Error),
}

impl PollOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Probe retry loop: one attempt per tick, bounded by an overall deadline.
pub struct Poller<C = SystemClock> {
    clock: C,
    interval: Duration,
    timeout: Duration,
    on_tick: Option<Box<dyn FnMut(u64) + Send>>,
}

impl Poller {
    /// Poller against the wall clock, probing every `interval` and giving up
    /// after `timeout`.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        assert!(interval > Duration::ZERO, "poll interval must be non-zero");
        Self {
            clock: SystemClock,
            interval,
            timeout,
            on_tick: None,
        }
    }
}

impl<C: TimeSource> Poller<C> {
    /// Swap the time source, e.g. for a fake clock in tests.
    #[must_use]
    pub fn with_clock<D: TimeSource>(self, clock: D) -> Poller<D> {
        Poller {
            clock,
            interval: self.interval,
            timeout: self.timeout,
            on_tick: self.on_tick,
        }
    }

    /// Install a hook fired exactly once per tick, with the tick count,
    /// before that tick's probe attempt runs.
    ///
    /// Tests use this to follow the loop's progress without sleeping.
    #[must_use]
    pub fn on_tick(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Run the loop to completion.
    ///
    /// On each tick the tick counter increments, the hook (if any) fires,
    /// and the probe runs. The deadline cuts the loop off from any state.
    ///
    /// Tie-break: when the deadline and a pending tick are ready at the same
    /// instant, the deadline wins — the select is biased towards it, so a
    /// tick coinciding with the deadline is never processed. Left unbiased
    /// this would be a scheduler race; biasing makes it deterministic.
    ///
    /// The probe is synchronous and cannot be cancelled mid-call; a probe
    /// that outruns the deadline delays the `Timeout` result until it
    /// returns. Known limitation.
    pub async fn poll<F>(mut self, mut probe: F) -> PollOutcome
    where
        F: FnMut() -> Result<(), ProbeFailure>,
    {
        let mut deadline = self.clock.after(self.timeout);
        let mut ticks = self.clock.every(self.interval);
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    tracing::debug!(ticks = tick_count, "poll timed out");
                    return PollOutcome::Timeout;
                }
                Some(()) = ticks.recv() => {
                    tick_count += 1;
                    tracing::trace!(tick = tick_count, "tick");
                    if let Some(hook) = self.on_tick.as_mut() {
                        hook(tick_count);
                    }
                    match probe() {
                        Ok(()) => {
                            tracing::debug!(ticks = tick_count, "probe succeeded");
                            return PollOutcome::Success;
                        }
                        Err(ProbeFailure::Retry(cause)) => {
                            tracing::debug!(tick = tick_count, %cause, "probe failed, retrying");
                        }
                        Err(ProbeFailure::Abort(cause)) => {
                            tracing::debug!(tick = tick_count, %cause, "probe aborted");
                            return PollOutcome::ProbeError(cause);
                        }
                    }
                }
            }
        }
    }
}
