// src/fetch/retry.rs
// =============================================================================
// Retry-with-backoff for fetches.
//
// Delay for attempt n (0-based) = base_delay * 2^n, capped at max_delay, plus
// optional jitter. The cancellation token is checked before every attempt
// and while sleeping, but a running attempt is never interrupted.
// =============================================================================

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How often and how patiently to retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to base_delay/2 of random delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_ms = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return capped;
        }
        let extra = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms));
        (capped + extra).min(self.max_delay)
    }
}

/// Outcome of one attempt.
pub enum Attempt<T, E> {
    Done(T),
    /// Transient failure, worth another try
    Retry(E),
    /// Permanent failure
    Fail(E),
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// retries, or the token is cancelled (`on_cancel` builds that error).
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    on_cancel: impl Fn() -> E,
    operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(on_cancel());
        }

        match operation(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(err),
            Attempt::Retry(err) if attempt >= policy.max_retries => return Err(err),
            Attempt::Retry(err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(on_cancel()),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_under_cap() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..32 {
            assert!(policy.delay_for_attempt(10) <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let result: Result<u32, String> = retry_with_backoff(
            &quick(),
            &token,
            || "cancelled".to_string(),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Attempt::Retry("HTTP 503".to_string())
                    } else {
                        Attempt::Done(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let result: Result<(), String> = retry_with_backoff(
            &quick(),
            &token,
            || "cancelled".to_string(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Fail("HTTP 404".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err("HTTP 404".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let result: Result<(), String> = retry_with_backoff(
            &quick(),
            &token,
            || "cancelled".to_string(),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Retry("HTTP 500".to_string()) }
            },
        )
        .await;

        assert_eq!(result, Err("HTTP 500".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), String> = retry_with_backoff(
            &quick(),
            &token,
            || "cancelled".to_string(),
            |_| async { Attempt::Done(()) },
        )
        .await;

        assert_eq!(result, Err("cancelled".to_string()));
    }
}
