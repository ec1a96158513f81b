//! The gateway wraps a [`ModelProvider`] with wall-clock latency, a per-call
//! timeout and cost accounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{CompletionRequest, ModelProvider, PriceTable, ProviderError, ProviderErrorKind, Result};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Normalized result of a gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub content: String,
    /// Model that served the call.
    pub model_id: String,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
    /// Wall-clock time around the provider call.
    pub latency_ms: u64,
    /// Cost computed from the static price table.
    pub cost_usd: f64,
}

/// Uniform entry point for text generation.
#[derive(Clone)]
pub struct Gateway {
    provider: Arc<dyn ModelProvider>,
    prices: PriceTable,
    timeout: Duration,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Gateway {
    /// Creates a gateway around `provider` with the default 60s timeout.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            prices: PriceTable,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Model configured on the underlying provider.
    #[must_use]
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Generates text. Fails with a `Timeout` kind once the per-call
    /// timeout elapses; errors are never retried here.
    #[instrument(skip(self, system_prompt, user_prompt), fields(provider = %self.provider.name()))]
    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Generation> {
        let request = CompletionRequest::new(system_prompt, user_prompt, temperature, max_tokens);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, self.provider.complete(&request)).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let completion = match outcome {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                warn!(error = %e, latency_ms, "Provider call failed");
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Provider call timed out");
                return Err(ProviderError::new(
                    self.provider.name(),
                    ProviderErrorKind::Timeout,
                    format!("no response within {}s", self.timeout.as_secs()),
                ));
            }
        };

        let cost_usd = self.prices.cost(
            &completion.model_id,
            completion.input_tokens,
            completion.output_tokens,
        );

        info!(
            model_id = %completion.model_id,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            latency_ms,
            cost_usd,
            "Provider call completed"
        );

        Ok(Generation {
            content: completion.content,
            model_id: completion.model_id,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            latency_ms,
            cost_usd,
        })
    }
}
