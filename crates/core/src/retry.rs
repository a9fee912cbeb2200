//! Bounded retry for transient provider failures.

use crate::{
    llm_client::{CompletionSettings, ProviderError, TurnExecutor},
    session::Turn,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Wraps an executor and repeats calls that failed with a transient error.
///
/// Authentication, rate-limit, request and response-shape errors are returned
/// after the first attempt.
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E> RetryingExecutor<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<E: TurnExecutor> TurnExecutor for RetryingExecutor<E> {
    async fn complete(
        &self,
        turns: &[Turn],
        settings: &CompletionSettings,
    ) -> Result<String, ProviderError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(turns, settings).await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(attempt, max_attempts, ?delay, error = %e, "Transient provider failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockTurnExecutor;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let mut inner = MockTurnExecutor::new();
        let mut failures = 2;
        inner.expect_complete().times(3).returning(move |_, _| {
            if failures > 0 {
                failures -= 1;
                Err(ProviderError::Server("502 bad gateway".into()))
            } else {
                Ok("finally".into())
            }
        });

        let executor = RetryingExecutor::new(inner, instant(3));
        let reply = executor
            .complete(&[Turn::user("hi")], &CompletionSettings::default())
            .await
            .unwrap();
        assert_eq!(reply, "finally");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut inner = MockTurnExecutor::new();
        inner
            .expect_complete()
            .times(3)
            .returning(|_, _| Err(ProviderError::Network("connection reset".into())));

        let executor = RetryingExecutor::new(inner, instant(3));
        let err = executor
            .complete(&[Turn::user("hi")], &CompletionSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Network("connection reset".into()));
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        for error in [
            ProviderError::Auth("bad key".into()),
            ProviderError::RateLimited("quota".into()),
            ProviderError::InvalidRequest("bad model".into()),
            ProviderError::MalformedResponse("empty".into()),
        ] {
            let mut inner = MockTurnExecutor::new();
            let returned = error.clone();
            inner
                .expect_complete()
                .times(1)
                .returning(move |_, _| Err(returned.clone()));

            let executor = RetryingExecutor::new(inner, instant(3));
            let err = executor
                .complete(&[Turn::user("hi")], &CompletionSettings::default())
                .await
                .unwrap_err();
            assert_eq!(err, error);
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let mut inner = MockTurnExecutor::new();
        inner
            .expect_complete()
            .times(1)
            .returning(|_, _| Err(ProviderError::Server("down".into())));

        let executor = RetryingExecutor::new(inner, instant(0));
        assert!(
            executor
                .complete(&[Turn::user("hi")], &CompletionSettings::default())
                .await
                .is_err()
        );
    }
}
