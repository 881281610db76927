//! Bounded retry around transport calls.
//!
//! Transient failures (network, provider throttling) are retried with
//! jittered exponential backoff; permanent failures pass through
//! unchanged on the first attempt. The total budget is bounded so a
//! per-user lock held across a relay is released in bounded time.

use crate::config::RetryConfig;
use crate::error::TransportError;
use mailroom_core::backoff;
use std::future::Future;
use std::time::Duration;

/// Retry policy derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, first try included. Clamped to at least 1.
    pub max_attempts: u32,
    /// Base backoff delay.
    pub base_delay: Duration,
    /// Upper bound for one delay, including provider-advertised
    /// retry-after intervals.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run a transport call with bounded retry.
///
/// Returns the first success, the first permanent error, or - after
/// the attempt budget is spent - the last transient error. The caller
/// maps an exhausted transient error to `TransportUnavailable`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max => {
                tracing::warn!("Transport call failed after {} attempts: {}", attempt, e);
                return Err(e);
            }
            Err(TransportError::RateLimited { retry_after }) => {
                // The provider knows its own window better than our
                // backoff curve does; honor it up to the cap.
                let wait = retry_after.min(policy.max_delay);
                tracing::warn!(
                    "Provider throttled us (attempt {}/{}); waiting {:?}",
                    attempt,
                    max,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                let wait = backoff::delay(attempt, policy.base_delay, policy.max_delay);
                tracing::warn!(
                    "Transport call failed (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    max,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TransportError>(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(4), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::Network("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Blocked) }
        })
        .await;

        assert!(matches!(result, Err(TransportError::Blocked)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_spends_exactly_the_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Network("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(TransportError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn provider_retry_after_is_honored_then_capped() {
        let calls = AtomicU32::new(0);
        let start = std::time::Instant::now();

        let result = with_retry(&fast_policy(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TransportError::RateLimited {
                        // Far above the 5ms cap; the wait must clamp.
                        retry_after: Duration::from_secs(60),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "retry-after must be capped by max_delay"
        );
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_tries_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let result = with_retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TransportError>(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
