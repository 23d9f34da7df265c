use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{RemoteError, Result};

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts:  u32,
    pub base_delay_ms: u64,
    pub max_delay_ms:  u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts:  5,
            base_delay_ms: 250,
            max_delay_ms:  10_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Upper bound of the delay before retry number `retry_count` (0-indexed).
    pub fn ceiling(&self, retry_count: u32) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        retry_delay(retry_count, Duration::from_millis(self.base_delay_ms)).min(max)
    }

    /// The ceiling with equal jitter applied: a uniform draw from its upper half.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let ceiling = self.ceiling(retry_count).as_millis() as u64;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        let half = ceiling / 2;
        Duration::from_millis(half + rand::thread_rng().gen_range(0..=ceiling - half))
    }
}

/// `base * 2^retry_count`, saturating.
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// Run `op` until it succeeds, fails permanently, or exhausts `policy`.
///
/// Only [`RemoteError::Transient`] is retried. Exhaustion is reported as
/// [`RemoteError::Unavailable`].
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(RemoteError::Transient(message)) if attempt < max_attempts => {
                let delay = policy.delay(attempt - 1);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transient remote error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(RemoteError::Transient(last)) => {
                return Err(RemoteError::Unavailable {
                    attempts: attempt,
                    last,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(0, base), Duration::from_millis(100));
        assert_eq!(retry_delay(1, base), Duration::from_millis(200));
        assert_eq!(retry_delay(3, base), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(retry_delay(64, Duration::from_millis(1)), Duration::from_millis(u32::MAX as u64));
        assert_eq!(retry_delay(u32::MAX, Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_ceiling_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(0), Duration::from_millis(250));
        assert_eq!(policy.ceiling(2), Duration::from_millis(1000));
        assert_eq!(policy.ceiling(20), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let policy = RetryPolicy::default();
        for retry in 0..8 {
            let ceiling = policy.ceiling(retry);
            for _ in 0..50 {
                let d = policy.delay(retry);
                assert!(d <= ceiling, "{d:?} vs {ceiling:?}");
                assert!(d.as_millis() >= ceiling.as_millis() / 2, "{d:?} vs {ceiling:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = retry(&RetryPolicy::immediate(5), "submit", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RemoteError::Transient("reset".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_unavailable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&RetryPolicy::immediate(3), "status", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RemoteError::Transient("timeout".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = retry(&RetryPolicy::immediate(5), "submit", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RemoteError::Rejected {
                status:  400,
                message: "bad selection".into(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let policy = RetryPolicy {
            max_attempts:  3,
            base_delay_ms: 100,
            max_delay_ms:  1_000,
        };
        let _ = retry(&policy, "status", || async {
            Err::<(), _>(RemoteError::Transient("503".into()))
        })
        .await;
        // Two sleeps: at least 50ms and 100ms.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
