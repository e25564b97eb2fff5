use crate::config::RetrySettings;
use crate::error::{Result, ShopError};
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

/// Runs `operation`, retrying storage conflicts with exponential backoff.
///
/// Any other error is returned after the first attempt. When the attempts
/// run out the last conflict is returned unchanged so callers still see a
/// retryable error.
pub async fn with_retry<F, Fut, T>(policy: &RetrySettings, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // backon counts retries, not attempts.
    let max_retries = policy.max_attempts.saturating_sub(1) as usize;

    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.initial_backoff())
        .with_max_delay(policy.max_backoff())
        .with_max_times(max_retries)
        .with_jitter();

    operation
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(ShopError::is_retryable)
        .notify(|err: &ShopError, dur: Duration| {
            tracing::warn!(
                backoff_ms = dur.as_millis() as u64,
                error = %err,
                "retrying after storage conflict"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetrySettings {
        RetrySettings {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(3), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ShopError::StorageConflict("busy".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy(2), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ShopError::StorageConflict("busy".into()))
        })
        .await;

        assert!(matches!(result, Err(ShopError::StorageConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_domain_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&policy(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ShopError::EmptyCart)
        })
        .await;

        assert!(matches!(result, Err(ShopError::EmptyCart)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
