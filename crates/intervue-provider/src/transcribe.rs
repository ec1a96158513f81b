//! Speech-to-text collaborator used before scoring audio-only responses.

use async_trait::async_trait;

use crate::{ProviderError, ProviderErrorKind, Result};

/// Converts a stored audio reference into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcriber identifier (e.g. "mock", "openai").
    fn name(&self) -> &str;

    /// Transcribes the audio found at `audio_ref`.
    async fn transcribe(&self, audio_ref: &str) -> Result<String>;
}

/// Stands in for a vendor that has no speech-to-text endpoint. Every call
/// fails, so audio-only responses are never scored against made-up text.
#[derive(Debug, Clone)]
pub struct UnavailableTranscriber {
    provider: String,
}

impl UnavailableTranscriber {
    /// Creates a transcriber reporting `provider` as the one lacking support.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl Transcriber for UnavailableTranscriber {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn transcribe(&self, _audio_ref: &str) -> Result<String> {
        Err(ProviderError::new(
            self.provider.clone(),
            ProviderErrorKind::Other,
            "transcription unavailable for this provider",
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_transcriber_always_fails() {
        let transcriber = UnavailableTranscriber::new("anthropic");
        assert_eq!(transcriber.name(), "unavailable");
        let err = transcriber.transcribe("audio/answer.webm").await.unwrap_err();
        assert_eq!(err.provider, "anthropic");
        assert!(err.message.contains("transcription unavailable"));
        assert!(!err.is_transient());
    }
}
