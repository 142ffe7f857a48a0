//! Bounded, cancellable polling.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::HarnessError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

/// Result of a single evaluation of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub satisfied: bool,
    pub observed: String,
}

impl Probe {
    pub fn ready(observed: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            observed: observed.into(),
        }
    }

    pub fn pending(observed: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            observed: observed.into(),
        }
    }
}

/// Evaluate `probe` now and then once per poll interval until it is satisfied.
///
/// The final evaluation happens at the deadline, so a predicate that never
/// holds yields `TimedOut` no earlier than `timeout` and no later than one
/// interval past it. A probe still running at that point is abandoned and
/// the last completed observation is reported. Probe errors end the wait
/// immediately; a cancelled `cancel` token interrupts it with `Cancelled`.
pub async fn wait_for<F, Fut>(
    condition: &str,
    options: WaitOptions,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<Probe, HarnessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe, HarnessError>>,
{
    let started = Instant::now();
    let deadline = later(started, options.timeout);
    let interval = options.interval();
    let hard_stop = later(deadline, interval);
    let mut polls: u32 = 0;
    let mut last_observed = String::from("no observation completed");

    loop {
        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled(format!("waiting for {}", condition)));
        }

        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(HarnessError::Cancelled(format!("waiting for {}", condition)));
            }
            res = probe() => res?,
            _ = sleep_until(hard_stop) => {
                tracing::debug!(
                    "Condition '{}' probe still pending at the deadline after {} poll(s)",
                    condition,
                    polls
                );
                return Err(HarnessError::TimedOut {
                    condition: condition.to_string(),
                    waited: hard_stop.duration_since(started),
                    last_observed,
                });
            }
        };
        polls += 1;

        if observation.satisfied {
            tracing::trace!(
                "Condition '{}' satisfied after {} poll(s) in {:?}",
                condition,
                polls,
                started.elapsed()
            );
            return Ok(observation);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(
                "Condition '{}' timed out after {} poll(s); last observed: {}",
                condition,
                polls,
                observation.observed
            );
            return Err(HarnessError::TimedOut {
                condition: condition.to_string(),
                waited: now.duration_since(started),
                last_observed: observation.observed,
            });
        }

        last_observed = observation.observed;
        let nap = interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(HarnessError::Cancelled(format!("waiting for {}", condition)));
            }
            _ = sleep(nap) => {}
        }
    }
}

fn later(from: Instant, by: Duration) -> Instant {
    from.checked_add(by).unwrap_or(from + FAR_FUTURE)
}

/// Sleep for `duration` unless cancelled first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), HarnessError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarnessError::Cancelled("pausing".to_string())),
        _ = sleep(duration) => Ok(()),
    }
}

/// Run a driver call, abandoning it if `cancel` fires first.
pub async fn guarded<T, Fut>(
    what: &str,
    cancel: &CancellationToken,
    fut: Fut,
) -> Result<T, HarnessError>
where
    Fut: Future<Output = Result<T, HarnessError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarnessError::Cancelled(what.to_string())),
        res = fut => res,
    }
}

/// Run a driver call, abandoning it if `cancel` fires first or it is still
/// pending after `limit`.
pub async fn bounded<T, Fut>(
    what: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: Fut,
) -> Result<T, HarnessError>
where
    Fut: Future<Output = Result<T, HarnessError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarnessError::Cancelled(what.to_string())),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(HarnessError::TimedOut {
                condition: what.to_string(),
                waited: limit,
                last_observed: "no response from the page".to_string(),
            }),
        },
    }
}
