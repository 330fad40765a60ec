//! Retry logic with exponential backoff.
//!
//! Provider calls are retried within a single step only. The whole step is
//! never retried.

use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (values below 1 act as 1).
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 doubles each time).
    pub backoff_multiplier: f64,

    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Config for provider calls: 1s, 2s, 4s ... between `max_attempts` tries.
    pub fn provider(max_attempts: u32) -> Self {
        Self { max_attempts, ..Self::default() }
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay to wait after `attempt` failed attempts (zero before the first).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            capped_delay * (1.0 + rand_jitter() * 0.25)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Pseudo-random jitter in 0.0..1.0 from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Errors that may tell the caller how long to back off.
pub trait RetryHint {
    /// Minimum wait requested by the remote side, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// False when another attempt cannot succeed.
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error).
    pub result: Result<T, E>,

    /// Number of attempts made.
    pub attempts: u32,

    /// Total time spent (including delays).
    pub total_time: Duration,

    /// Whether the operation was retried.
    pub was_retried: bool,
}

impl<T, E> RetryResult<T, E> {
    /// Check if the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Get the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Retry an async operation with the given configuration.
///
/// A `retry_after` hint on the error lengthens the next delay but never
/// shortens it. The last error is returned once attempts are exhausted.
pub async fn retry_async<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: RetryHint + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let max_attempts = config.attempt_budget();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation(attempts).await {
            Err(e) if attempts < max_attempts && e.is_retryable() => {
                let mut delay = config.delay_for_attempt(attempts);
                if let Some(hint) = e.retry_after() {
                    delay = delay.max(hint.min(config.max_delay));
                }
                tracing::warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => {
                return RetryResult {
                    result,
                    attempts,
                    total_time: start.elapsed(),
                    was_retried: attempts > 1,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(Option<Duration>);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky")
        }
    }

    impl RetryHint for Flaky {
        fn retry_after(&self) -> Option<Duration> {
            self.0
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_provider_config_doubles() {
        let config = RetryConfig::provider(3);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig { backoff_multiplier: 10.0, max_delay: Duration::from_secs(5), ..RetryConfig::default() };
        assert!(config.delay_for_attempt(6) <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_success_after_two_failures_uses_three_attempts() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&fast(3), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Flaky(None))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(result.attempts, 3);
        assert!(result.was_retried);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&fast(2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Flaky(None)) }
        })
        .await;

        assert!(!result.is_ok());
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let result = retry_async(&fast(0), |_| async { Ok::<_, Flaky>(1) }).await;
        assert_eq!(result.attempts, 1);
        assert!(!result.was_retried);
    }

    #[tokio::test]
    async fn test_retry_after_hint_lengthens_delay() {
        let attempt_seen = AtomicU32::new(0);
        let result = retry_async(&fast(2), |attempt| {
            attempt_seen.store(attempt, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(Flaky(Some(Duration::from_millis(15))))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempt_seen.load(Ordering::SeqCst), 2);
        assert!(result.total_time >= Duration::from_millis(15));
    }

    #[derive(Debug)]
    struct Fatal;

    impl std::fmt::Display for Fatal {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fatal")
        }
    }

    impl RetryHint for Fatal {
        fn is_retryable(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_at_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&fast(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Fatal) }
        })
        .await;

        assert_eq!(result.attempts, 1);
        assert!(!result.was_retried);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
