//! Retry policy for calls to external providers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{RagError, Result};

type RetryPredicate = Arc<dyn Fn(&RagError) -> bool + Send + Sync>;

/// Bounded exponential-backoff retry policy.
///
/// An operation is attempted at most `max_attempts` times. Between attempts the
/// delay starts at `initial_delay` and doubles up to `max_delay`. Only errors
/// accepted by the retryable predicate are repeated; by default that is
/// [`RagError::is_retryable`].
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and default delays (1s, capped at 10s).
    pub fn new(max_attempts: u32) -> Self {
        Self::from_config(&RetryConfig { max_attempts, ..RetryConfig::default() })
    }

    /// Create a policy from a [`RetryConfig`].
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            retryable: Arc::new(RagError::is_retryable),
        }
    }

    /// A policy that attempts every operation exactly once.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Set the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replace the predicate that decides which errors are repeated.
    pub fn with_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RagError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `error` should be retried under this policy.
    pub fn should_retry(&self, error: &RagError) -> bool {
        (self.retryable)(error)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is exhausted. The last error is returned on failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        f.retry(self.backoff())
            .when(|e: &RagError| self.should_retry(e))
            .notify(|e: &RagError, delay: Duration| {
                warn!(operation, error = %e, ?delay, "transient failure, retrying");
            })
            .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RagError::transient_embedding("mock", "503"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::transient_embedding("mock", "429"))
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_fast_on_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::permanent_embedding("mock", "401"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_overrides_default() {
        let calls = AtomicU32::new(0);
        let policy = fast(2).with_retryable(|e| matches!(e, RagError::StoreUnavailable { .. }));
        let result: Result<()> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::store_unavailable("mock", "down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attempts_are_at_least_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
    }
}
