//! Async retry with exponential backoff and jitter, applied only to transient errors.

use crate::error::OntologyError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const BASE_DELAY_MS: u64 = 100;

/// Retries `f` while it returns a `TransientExternal` error, up to `max_attempts` total
/// tries (the first call plus `max_attempts - 1` retries). Any other error kind is
/// returned immediately without retrying. `on_retry` fires once per retry, so callers
/// can surface a retry count as a metric without this function owning any counter.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, mut f: F, mut on_retry: impl FnMut()) -> Result<T, OntologyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OntologyError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_with_jitter(attempt);
                warn!(attempt = attempt + 1, ?delay, error = %e, "retrying transient error");
                on_retry();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            r => return r,
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0..=base / 4 + 1);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            3,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(OntologyError::TransientExternal("boom".into()))
                } else {
                    Ok(42)
                }
            },
            || {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_retry(
            5,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OntologyError::Validation("bad input".into()))
            },
            || {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, _> = with_retry(
            3,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OntologyError::TransientExternal("still down".into()))
            },
            || {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
