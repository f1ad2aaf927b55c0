/// Bounded polling
///
/// Readiness and synchronization contracts are expressed as a retry policy
/// value plus a generic wait primitive, so the loops can be unit-tested with
/// zero-interval policies instead of real timers.
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// One-second cadence, the documented default for readiness probes.
    pub const fn seconds(max_attempts: u32) -> Self {
        Self::new(Duration::from_secs(1), max_attempts)
    }
}

/// Result of a single poll attempt.
pub enum PollOutcome<T, E> {
    /// The awaited condition holds; stop polling.
    Ready(T),
    /// Not there yet; sleep and poll again.
    NotYet,
    /// A terminal condition was observed; stop polling and fail.
    Failed(E),
}

#[derive(Error, Debug)]
pub enum WaitError<E> {
    #[error("condition not met after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("{0}")]
    Aborted(E),
}

/// Poll `poll` (which receives the 1-based attempt number) until it reports
/// `Ready`, a terminal failure, or the policy's attempt budget runs out.
/// Sleeps `policy.interval` between attempts, not after the last one.
pub async fn wait_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut poll: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollOutcome<T, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match poll(attempt).await {
            PollOutcome::Ready(value) => return Ok(value),
            PollOutcome::Failed(err) => return Err(WaitError::Aborted(err)),
            PollOutcome::NotYet => {
                if attempt < policy.max_attempts && !policy.interval.is_zero() {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }
    Err(WaitError::TimedOut {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::ZERO, max_attempts)
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let result: Result<u32, WaitError<String>> =
            wait_until(&instant_policy(5), |_| async { PollOutcome::Ready(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_ready_after_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, WaitError<String>> =
            wait_until(&instant_policy(10), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt >= 4 {
                        PollOutcome::Ready(attempt)
                    } else {
                        PollOutcome::NotYet
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let result: Result<(), WaitError<String>> =
            wait_until(&instant_policy(3), |_| async { PollOutcome::NotYet }).await;
        match result {
            Err(WaitError::TimedOut { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_terminal_failure_stops_polling() {
        let calls = AtomicU32::new(0);
        let result: Result<(), WaitError<&str>> = wait_until(&instant_policy(10), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { PollOutcome::Failed("process died") }
        })
        .await;
        assert!(matches!(result, Err(WaitError::Aborted("process died"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
