//! Bounded retry with failure classification.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep `attempt * step` after the `attempt`-th failure.
    Linear { step: Duration },
    Fixed { delay: Duration },
}

impl Backoff {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { step } => step.saturating_mul(attempt),
            Backoff::Fixed { delay } => delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { step },
        }
    }

    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Terminal,
}

#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {last}")]
pub struct RetryError<E> {
    pub operation: &'static str,
    pub attempts: u32,
    pub last: E,
}

/// Runs `operation` until it succeeds, fails terminally, runs out of attempts
/// or `cancel` fires during a backoff sleep. The closure receives the
/// 1-based attempt number.
pub async fn with_retry<T, E, F, Fut, C>(
    operation_name: &'static str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    classify: C,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Disposition,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!("{operation_name} attempt {attempt}/{max_attempts}");
        let err = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{operation_name} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let exhausted = RetryError {
            operation: operation_name,
            attempts: attempt,
            last: err,
        };
        if classify(&exhausted.last) == Disposition::Terminal || attempt >= max_attempts {
            return Err(exhausted);
        }

        let delay = policy.backoff.delay_after(attempt);
        warn!(
            "{operation_name} attempt {attempt}/{max_attempts} failed: {}; retrying in {delay:?}",
            exhausted.last
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(exhausted),
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn assert_secs(actual: Duration, secs: u64) {
        let expected = Duration::from_secs(secs);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(100),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn transient_if_busy(err: &String) -> Disposition {
        if err.contains("busy") {
            Disposition::Transient
        } else {
            Disposition::Terminal
        }
    }

    #[test]
    fn test_backoff_delays() {
        let linear = Backoff::Linear {
            step: Duration::from_secs(2),
        };
        assert_eq!(linear.delay_after(1), Duration::from_secs(2));
        assert_eq!(linear.delay_after(2), Duration::from_secs(4));

        let fixed = Backoff::Fixed {
            delay: Duration::from_secs(60),
        };
        assert_eq!(fixed.delay_after(1), Duration::from_secs(60));
        assert_eq!(fixed.delay_after(99), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let start = Instant::now();
        let result = with_retry(
            "op",
            RetryPolicy::linear(3, Duration::from_secs(2)),
            &CancellationToken::new(),
            |attempt| async move {
                if attempt < 3 {
                    Err(format!("busy #{attempt}"))
                } else {
                    Ok(attempt)
                }
            },
            transient_if_busy,
        )
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_secs(start.elapsed(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_failure() {
        let calls = Mutex::new(Vec::new());
        let err = with_retry(
            "op",
            RetryPolicy::linear(3, Duration::from_secs(2)),
            &CancellationToken::new(),
            |attempt| {
                calls.lock().unwrap().push(Instant::now());
                async move { Err::<(), _>(format!("busy #{attempt}")) }
            },
            transient_if_busy,
        )
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last, "busy #3");

        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 3);
        assert_secs(calls[1] - calls[0], 2);
        assert_secs(calls[2] - calls[1], 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_stops_immediately() {
        let start = Instant::now();
        let err = with_retry(
            "op",
            RetryPolicy::linear(3, Duration::from_secs(2)),
            &CancellationToken::new(),
            |_| async { Err::<(), _>("permission denied".to_string()) },
            transient_if_busy,
        )
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_secs(start.elapsed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_policy() {
        let start = Instant::now();
        let err = with_retry(
            "op",
            RetryPolicy::fixed(4, Duration::from_secs(10)),
            &CancellationToken::new(),
            |_| async { Err::<(), _>("busy".to_string()) },
            transient_if_busy,
        )
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_secs(start.elapsed(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = with_retry(
            "op",
            RetryPolicy::fixed(100, Duration::from_secs(60)),
            &cancel,
            |_| async { Err::<(), _>("busy".to_string()) },
            transient_if_busy,
        )
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
