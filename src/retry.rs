//! Bounded retry with exponential backoff
//!
//! Wraps connection establishment and every individual remote call.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};
use tracing::warn;

use crate::error::{ElectrumError, Result};

/// Default number of attempts per unit of work
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Retry policy, fixed at client construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that
    pub backoff_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryConfig {
    pub fn new(attempts: u32, backoff_step: Duration) -> Self {
        Self {
            attempts,
            backoff_step,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_step)
            .with_factor(2.0)
            .with_max_times(self.attempts.saturating_sub(1) as usize)
    }

    /// Delays slept between consecutive attempts
    pub fn delays(&self) -> Vec<Duration> {
        self.backoff().build().collect()
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts
    ///
    /// The error of the last attempt is returned untouched.
    pub async fn retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        operation
            .retry(self.backoff())
            .when(ElectrumError::is_retryable)
            .notify(|err: &ElectrumError, delay: Duration| {
                warn!(operation = label, error = %err, ?delay, "attempt failed, retrying");
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_delays_are_exponential() {
        let config = RetryConfig::new(4, Duration::from_millis(100));
        assert_eq!(
            config.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn test_single_attempt_never_sleeps() {
        assert!(RetryConfig::new(1, Duration::from_secs(1)).delays().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = RetryConfig::new(3, Duration::from_millis(10));

        let result: Result<()> = config
            .retry("test", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(ElectrumError::action("test", format!("failure {}", n)))
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // Last error propagates untouched
        assert!(result.unwrap_err().to_string().contains("failure 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = RetryConfig::new(3, Duration::from_millis(10));

        let result = config
            .retry("test", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ElectrumError::connection("reset"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let config = RetryConfig::new(5, Duration::from_millis(1));

        let result: Result<()> = config
            .retry("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ElectrumError::Rejected {
                    method: "blockchain.transaction.broadcast".to_string(),
                    code: 1,
                    message: "Transaction already in block chain".to_string(),
                })
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ElectrumError::Rejected { .. })));
    }
}
