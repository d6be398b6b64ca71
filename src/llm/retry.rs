//! Retry wrapper around a provider
//!
//! Transient faults (rate limits, 5xx, dropped connections) are retried with
//! exponential backoff; every other error goes straight back to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{field, info_span, warn, Instrument};

use crate::core::config::RetryConfig;
use crate::core::{AgentError, Result};
use crate::llm::traits::{ChatRequest, Provider, ProviderResponse};

/// Backoff settings for provider calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Add up to one second of random jitter
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (0-based): base * 2^attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor);
        if self.jitter {
            delay.saturating_add(Duration::from_millis(rand::random::<u64>() % 1000))
        } else {
            delay
        }
    }
}

/// Provider decorator that retries transient failures
#[derive(Clone)]
pub struct RetryingTransport {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send a request, retrying transient failures until the attempts run out.
    ///
    /// Cancellation interrupts both an in-flight call and a backoff sleep.
    pub async fn send(
        &self,
        request: &ChatRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        let span = info_span!(
            "llm.chat",
            gen_ai.system = self.inner.name(),
            gen_ai.request.model = self.inner.model(),
            gen_ai.request.temperature = field::debug(request.temperature),
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.usage.input_tokens = field::Empty,
            gen_ai.usage.output_tokens = field::Empty,
            attempts = field::Empty,
        );

        let result = self.send_with_retry(request, cancel).instrument(span.clone()).await;

        if let Ok(response) = &result {
            span.record("gen_ai.usage.input_tokens", response.usage.input_tokens);
            span.record("gen_ai.usage.output_tokens", response.usage.output_tokens);
        }
        result
    }

    async fn send_with_retry(
        &self,
        request: &ChatRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                res = self.inner.chat(request) => res,
            };

            match result {
                Ok(response) => {
                    tracing::Span::current().record("attempts", attempt + 1);
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying provider call after transient error"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Provider for RetryingTransport {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ProviderResponse> {
        self.send(request, &CancellationToken::new()).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
