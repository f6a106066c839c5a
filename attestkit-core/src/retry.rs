use std::future::Future;

use backon::Retryable;

use crate::config::RetryPolicy;
use crate::platform::AttestationServiceError;

/// Runs `operation` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only [`AttestationServiceError::Transient`] failures are retried. The last error is
/// returned when retries run out.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    task_description: &str,
    operation: F,
) -> Result<T, AttestationServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttestationServiceError>>,
{
    operation
        .retry(policy.backoff())
        .when(AttestationServiceError::is_transient)
        .notify(|error, delay| {
            log::warn!("{task_description} failed, retrying in {delay:?}: {error}");
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let result = with_retry(&fast_policy(3), "test", || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AttestationServiceError::Transient("unreachable".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let result: Result<(), _> = with_retry(&fast_policy(3), "test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AttestationServiceError::Permanent("bad project".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AttestationServiceError::Permanent(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let result: Result<(), _> = with_retry(&fast_policy(2), "test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AttestationServiceError::Transient("unreachable".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AttestationServiceError::Transient(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
