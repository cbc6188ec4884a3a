//! Poll-with-deadline utility.
//!
//! The target UI exposes no events, so every "wait for X" in this crate is a
//! poll loop. They all go through this single abstraction: a probe closure,
//! an interval, a deadline, and a cancellation token.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Outcome of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value before the deadline.
    Completed(T),
    /// The deadline passed without the probe producing a value.
    TimedOut,
    /// The cancellation token fired while waiting.
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs `probe` every `interval` until it returns `Some`, the `timeout`
/// elapses, or `cancel` fires. Probe errors abort the poll immediately.
///
/// The probe always runs at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        if let Some(value) = probe().await? {
            return Ok(PollOutcome::Completed(value));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(PollOutcome::TimedOut);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn completes_when_probe_succeeds() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let cancel = CancellationToken::new();
        let outcome = poll_until(
            Duration::from_millis(100),
            Duration::from_secs(5),
            &cancel,
            || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(if n >= 2 { Some(n) } else { None })
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Completed(2));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_probe_never_succeeds() {
        let cancel = CancellationToken::new();
        let outcome: PollOutcome<()> = poll_until(
            Duration::from_millis(100),
            Duration::from_millis(350),
            &cancel,
            || async { Ok(None) },
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_the_interval_sleep() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome: PollOutcome<()> = poll_until(
            Duration::from_millis(100),
            Duration::from_secs(60),
            &cancel,
            || async { Ok(None) },
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_runs_at_least_once_with_zero_timeout() {
        let cancel = CancellationToken::new();
        let outcome = poll_until(
            Duration::from_millis(100),
            Duration::ZERO,
            &cancel,
            || async { Ok(Some(7)) },
        )
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Completed(7));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_abort_the_poll() {
        let cancel = CancellationToken::new();
        let result: Result<PollOutcome<()>> = poll_until(
            Duration::from_millis(100),
            Duration::from_secs(5),
            &cancel,
            || async { anyhow::bail!("element lookup crashed") },
        )
        .await;
        assert!(result.is_err());
    }
}
