//! Provider selection.
//!
//! The provider is chosen once at startup from configuration. When a real
//! vendor is selected but its credentials are absent the factory falls back
//! to the mock implementations and says so at `warn` level.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gateway::DEFAULT_CALL_TIMEOUT;
use crate::{
    anthropic, openai, AnthropicProvider, Gateway, MockProvider, MockTranscriber, ModelProvider,
    OpenAiProvider, OpenAiTranscriber, Result, Transcriber, UnavailableTranscriber,
};

/// Supported model provider backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    /// Deterministic offline provider (default).
    #[default]
    Mock,
    /// `OpenAI` chat completions.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
}

impl ProviderKind {
    /// Parses a string into a `ProviderKind`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Some(Self::Mock),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid provider '{s}': expected one of 'mock', 'openai', 'anthropic'"
            ))
        })
    }
}

impl Serialize for ProviderKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Everything needed to construct a provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Selected backend.
    pub kind: ProviderKind,
    /// Model override; each vendor has its own default.
    pub model: Option<String>,
    /// Vendor API key.
    pub api_key: Option<SecretString>,
    /// API base URL override.
    pub base_url: Option<String>,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            model: None,
            api_key: None,
            base_url: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Returns the API key when a real vendor is selected and a key is set.
    fn vendor_key(&self) -> Option<SecretString> {
        match self.kind {
            ProviderKind::Mock => None,
            ProviderKind::OpenAi | ProviderKind::Anthropic => {
                let key = self.api_key.clone();
                if key.is_none() {
                    warn!(
                        provider = %self.kind,
                        "No API key configured; falling back to the mock provider"
                    );
                }
                key
            }
        }
    }
}

/// Builds the configured model provider.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
    let Some(api_key) = config.vendor_key() else {
        return Ok(Arc::new(MockProvider::new()));
    };

    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            api_key,
            config.model.clone().unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
            config.base_url.clone(),
            config.timeout,
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            api_key,
            config
                .model
                .clone()
                .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string()),
            config.base_url.clone(),
            config.timeout,
        )?),
        ProviderKind::Mock => Arc::new(MockProvider::new()),
    };

    info!(provider = provider.name(), model = provider.model_id(), "Model provider selected");
    Ok(provider)
}

/// Builds the configured provider wrapped in a [`Gateway`].
pub fn build_gateway(config: &ProviderConfig) -> Result<Gateway> {
    Ok(Gateway::new(build_provider(config)?).with_timeout(config.timeout))
}

/// Builds the transcriber matching the configured provider.
///
/// The mock provider, or a vendor missing its key, gets the mock
/// transcriber. `OpenAI` transcribes through Whisper. A vendor without a
/// speech-to-text endpoint gets a transcriber that always fails.
pub fn build_transcriber(config: &ProviderConfig) -> Result<Arc<dyn Transcriber>> {
    let Some(api_key) = config.vendor_key() else {
        return Ok(Arc::new(MockTranscriber::new()));
    };
    match config.kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiTranscriber::new(
            api_key,
            config.base_url.clone(),
            config.timeout,
        )?)),
        ProviderKind::Anthropic => {
            warn!(
                provider = %config.kind,
                "Provider has no transcription endpoint; audio-only responses will fail"
            );
            Ok(Arc::new(UnavailableTranscriber::new(config.kind.as_str())))
        }
        ProviderKind::Mock => Ok(Arc::new(MockTranscriber::new())),
    }
}
