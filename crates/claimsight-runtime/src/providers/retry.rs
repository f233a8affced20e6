//! Retry with exponential backoff around any provider.
//!
//! Retrying is a collaborator policy: the orchestrator never retries a
//! model call itself. Wrap a provider here when transient failures
//! (rate limits, timeouts, 5xx) should be absorbed before they reach a
//! processor or the adjudicator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::config::human_duration;

/// Backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: usize,

    #[serde(with = "human_duration")]
    pub min_delay: Duration,

    #[serde(with = "human_duration")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Provider wrapper that retries transient failures.
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.policy.min_delay)
            .with_max_delay(self.policy.max_delay)
            .with_max_times(self.policy.max_retries);

        let attempt = || async { self.inner.complete(messages.clone(), config).await };

        attempt
            .retry(backoff)
            .when(ProviderError::is_retryable)
            .notify(|err: &ProviderError, delay: Duration| {
                tracing::warn!(
                    provider = self.inner.name(),
                    model = %config.model,
                    error = %err,
                    delay = ?delay,
                    "Model call failed, retrying"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TokenUsage;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        failures_before_success: u32,
        retryable: bool,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                return Err(if self.retryable {
                    ProviderError::RateLimited { retry_after: None }
                } else {
                    ProviderError::AuthError
                });
            }
            Ok(CompletionResponse {
                content: "ok".to_string(),
                usage: TokenUsage::default(),
                model: "flaky".to_string(),
                stop_reason: None,
            })
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures_before_success: 2,
            retryable: true,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let response = provider
            .complete(vec![ChatMessage::user("hi")], &CompletionConfig::default())
            .await
            .unwrap();

        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures_before_success: 5,
            retryable: false,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let result = provider
            .complete(vec![ChatMessage::user("hi")], &CompletionConfig::default())
            .await;

        assert!(matches!(result, Err(ProviderError::AuthError)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures_before_success: 10,
            retryable: true,
        });
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let result = provider
            .complete(vec![ChatMessage::user("hi")], &CompletionConfig::default())
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }
}
