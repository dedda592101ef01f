//! Bounded poll-with-backoff for long-running host commands.
//!
//! The host exposes only a busy flag for asynchronous commands. This module
//! polls it with an exponentially growing sleep, capped per step and
//! bounded overall, and never spins.

use std::time::Duration;

use prosper_types::AppName;
use tokio::time::Instant;

use crate::error::BridgeError;

/// Default first sleep between polls.
const DEFAULT_INITIAL_STEP_MS: u64 = 1;

/// Default ceiling for a single sleep.
const DEFAULT_MAX_STEP_MS: u64 = 2000;

/// Default overall wait cap (10 minutes).
const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Polling schedule for [`wait_for_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Sleep after the first busy poll.
    pub initial_step: Duration,
    /// Upper bound for any single sleep.
    pub max_step: Duration,
    /// Give up once this much time has passed.
    pub timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_step: Duration::from_millis(DEFAULT_INITIAL_STEP_MS),
            max_step: Duration::from_millis(DEFAULT_MAX_STEP_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl BackoffPolicy {
    /// The sleep that follows `step`: doubled, clamped to `max_step`.
    fn next_step(&self, step: Duration) -> Duration {
        step.saturating_mul(2).min(self.max_step)
    }
}

/// Poll `is_busy` until it reports idle, sleeping between polls.
///
/// Returns the number of busy polls observed.
///
/// # Errors
///
/// Returns [`BridgeError::Timeout`] once `policy.timeout` has elapsed with
/// the host still busy, or the first error returned by `is_busy`.
pub async fn wait_for_completion<F>(
    app: AppName,
    policy: &BackoffPolicy,
    mut is_busy: F,
) -> Result<u32, BridgeError>
where
    F: FnMut() -> Result<bool, BridgeError>,
{
    let started = Instant::now();
    let mut step = policy.initial_step.min(policy.max_step);
    let mut busy_polls: u32 = 0;

    while is_busy()? {
        busy_polls = busy_polls.saturating_add(1);
        let waited = started.elapsed();
        if waited >= policy.timeout {
            tracing::warn!(%app, ?waited, busy_polls, "Host still busy, giving up");
            return Err(BridgeError::Timeout { app, waited });
        }

        let remaining = policy.timeout.saturating_sub(waited);
        tokio::time::sleep(step.min(remaining)).await;
        step = policy.next_step(step);
    }

    tracing::debug!(%app, busy_polls, elapsed = ?started.elapsed(), "Host command completed");
    Ok(busy_polls)
}
