//! Configuration types for the Intervue server.
//!
//! Configuration is read from `intervue.json` (camelCase keys). Every field
//! has a default, so a missing file or a partial file is fine. Secrets never
//! live in the file: API keys come from the environment.

use std::path::Path;
use std::time::Duration;

use intervue_provider::{ProviderConfig, ProviderKind};
use intervue_sandbox::SandboxLimits;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{IntervueError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "intervue.json";

/// Environment variable holding the `OpenAI` API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable overriding `provider.kind`.
pub const PROVIDER_ENV: &str = "INTERVUE_PROVIDER";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_workers() -> usize {
    4
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_provider_timeout() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_feedback_temperature() -> f32 {
    0.3
}

const fn default_feedback_max_tokens() -> u32 {
    2000
}

const fn default_practice_temperature() -> f32 {
    0.7
}

const fn default_practice_max_tokens() -> u32 {
    3000
}

fn default_prompt_version() -> String {
    "v1".to_string()
}

const fn default_max_practice_count() -> u32 {
    10
}

const fn default_replay_limit() -> usize {
    20
}

const fn default_context_messages() -> usize {
    10
}

const fn default_chat_temperature() -> f32 {
    0.7
}

const fn default_chat_max_tokens() -> u32 {
    500
}

const fn default_sandbox_timeout() -> u64 {
    10
}

const fn default_memory_mb() -> u64 {
    512
}

const fn default_cpu_share() -> f64 {
    0.5
}

const fn default_max_code_chars() -> usize {
    10_000
}

const fn default_pids_limit() -> i64 {
    64
}

fn default_sandbox_user() -> String {
    "65534:65534".to_string()
}

/// Main configuration for the Intervue server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener and worker pool.
    #[serde(default)]
    pub server: ServerConfig,

    /// Model provider selection.
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Feedback and practice generation.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Interview chat sessions.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Code execution limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// HTTP listener and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of background generation workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait for a free worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Model provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Backend to use.
    #[serde(default)]
    pub kind: ProviderKind,

    /// Model override; each vendor has its own default.
    #[serde(default)]
    pub model: Option<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    /// API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key, taken from the environment only.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            timeout_seconds: default_provider_timeout(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Feedback and practice generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Explicit retries allowed per feedback run.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature for feedback.
    #[serde(default = "default_feedback_temperature")]
    pub feedback_temperature: f32,

    /// Token budget for feedback.
    #[serde(default = "default_feedback_max_tokens")]
    pub feedback_max_tokens: u32,

    /// Sampling temperature for practice items.
    #[serde(default = "default_practice_temperature")]
    pub practice_temperature: f32,

    /// Token budget for practice items.
    #[serde(default = "default_practice_max_tokens")]
    pub practice_max_tokens: u32,

    /// Version tag folded into every prompt identity.
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,

    /// Largest practice batch a caller may request.
    #[serde(default = "default_max_practice_count")]
    pub max_practice_count: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            feedback_temperature: default_feedback_temperature(),
            feedback_max_tokens: default_feedback_max_tokens(),
            practice_temperature: default_practice_temperature(),
            practice_max_tokens: default_practice_max_tokens(),
            prompt_version: default_prompt_version(),
            max_practice_count: default_max_practice_count(),
        }
    }
}

/// Interview chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Messages replayed to a reconnecting client.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,

    /// Messages of history sent with each interviewer turn.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Sampling temperature for interviewer replies.
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,

    /// Token budget for interviewer replies.
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,

    /// Always ask the model for the opening question.
    #[serde(default)]
    pub generate_opening_question: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            replay_limit: default_replay_limit(),
            context_messages: default_context_messages(),
            chat_temperature: default_chat_temperature(),
            chat_max_tokens: default_chat_max_tokens(),
            generate_opening_question: false,
        }
    }
}

/// Code execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Wall-clock limit per run.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_seconds: u64,

    /// Memory ceiling per run.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    /// Fraction of one CPU core.
    #[serde(default = "default_cpu_share")]
    pub cpu_share: f64,

    /// Maximum source length in characters.
    #[serde(default = "default_max_code_chars")]
    pub max_code_chars: usize,

    /// Maximum processes per run.
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,

    /// Non-root `uid:gid` programs run as.
    #[serde(default = "default_sandbox_user")]
    pub user: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_sandbox_timeout(),
            memory_mb: default_memory_mb(),
            cpu_share: default_cpu_share(),
            max_code_chars: default_max_code_chars(),
            pids_limit: default_pids_limit(),
            user: default_sandbox_user(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `intervue.json` in the current directory. If not found,
    /// returns the default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            IntervueError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `intervue.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `IntervueError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values, and
    /// `IntervueError::ConfigValidationError` if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(IntervueError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| IntervueError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `INTERVUE_PROVIDER` and the vendor API keys from the process
    /// environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(PROVIDER_ENV).filter(|v| !v.trim().is_empty()) {
            self.provider.kind =
                ProviderKind::from_str_case_insensitive(value.trim()).ok_or_else(|| {
                    IntervueError::config_validation(
                        format!("{PROVIDER_ENV}='{value}' is not a known provider"),
                        "Use one of 'mock', 'openai', 'anthropic'",
                    )
                })?;
        }

        let key_var = match self.provider.kind {
            ProviderKind::Mock => None,
            ProviderKind::OpenAi => Some(OPENAI_API_KEY_ENV),
            ProviderKind::Anthropic => Some(ANTHROPIC_API_KEY_ENV),
        };
        self.provider.api_key = key_var
            .and_then(&lookup)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        Ok(())
    }

    /// Provider factory input.
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            kind: self.provider.kind,
            model: self.provider.model.clone(),
            api_key: self.provider.api_key.clone(),
            base_url: self.provider.base_url.clone(),
            timeout: Duration::from_secs(self.provider.timeout_seconds),
        }
    }

    /// Sandbox limits derived from the `sandbox` section.
    #[must_use]
    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            timeout: Duration::from_secs(self.sandbox.timeout_seconds),
            memory_mb: self.sandbox.memory_mb,
            cpu_share: self.sandbox.cpu_share,
            max_code_chars: self.sandbox.max_code_chars,
            pids_limit: self.sandbox.pids_limit,
            user: self.sandbox.user.clone(),
        }
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `IntervueError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        require(self.server.workers > 0, "server.workers")?;
        require(self.server.queue_capacity > 0, "server.queueCapacity")?;
        require(self.provider.timeout_seconds > 0, "provider.timeoutSeconds")?;
        require(self.pipeline.max_retries > 0, "pipeline.maxRetries")?;
        require(self.pipeline.feedback_max_tokens > 0, "pipeline.feedbackMaxTokens")?;
        require(self.pipeline.practice_max_tokens > 0, "pipeline.practiceMaxTokens")?;
        require(self.pipeline.max_practice_count > 0, "pipeline.maxPracticeCount")?;
        require(self.chat.replay_limit > 0, "chat.replayLimit")?;
        require(self.chat.context_messages > 0, "chat.contextMessages")?;
        require(self.chat.chat_max_tokens > 0, "chat.chatMaxTokens")?;
        require(self.sandbox.timeout_seconds > 0, "sandbox.timeoutSeconds")?;
        require(self.sandbox.memory_mb > 0, "sandbox.memoryMb")?;
        require(self.sandbox.max_code_chars > 0, "sandbox.maxCodeChars")?;
        require(self.sandbox.pids_limit > 0, "sandbox.pidsLimit")?;

        for (name, value) in [
            ("pipeline.feedbackTemperature", self.pipeline.feedback_temperature),
            ("pipeline.practiceTemperature", self.pipeline.practice_temperature),
            ("chat.chatTemperature", self.chat.chat_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(IntervueError::config_validation(
                    format!("{name} must be between 0 and 2"),
                    format!("Set {name} to a value such as 0.7 in your intervue.json"),
                ));
            }
        }

        if !(self.sandbox.cpu_share > 0.0 && self.sandbox.cpu_share <= 1.0) {
            return Err(IntervueError::config_validation(
                "sandbox.cpuShare must be greater than 0 and at most 1",
                "Set sandbox.cpuShare to a fraction of one core, e.g. 0.5",
            ));
        }

        if self.pipeline.prompt_version.trim().is_empty() {
            return Err(IntervueError::config_validation(
                "pipeline.promptVersion must not be empty",
                "Set pipeline.promptVersion to a tag such as \"v1\"",
            ));
        }

        let user = self.sandbox.user.trim();
        if user.is_empty() || user == "root" || user.split(':').next() == Some("0") {
            return Err(IntervueError::config_validation(
                "sandbox.user must name a non-root uid:gid",
                "Set sandbox.user to an unprivileged id such as \"65534:65534\"",
            ));
        }

        Ok(())
    }
}

fn require(ok: bool, name: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(IntervueError::config_validation(
            format!("{name} must be greater than 0"),
            format!("Set {name} to at least 1 in your intervue.json"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.provider.kind, ProviderKind::Mock);
        assert_eq!(config.provider.timeout_seconds, 60);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.pipeline.feedback_max_tokens, 2000);
        assert_eq!(config.pipeline.practice_max_tokens, 3000);
        assert_eq!(config.pipeline.prompt_version, "v1");
        assert_eq!(config.chat.replay_limit, 20);
        assert_eq!(config.chat.context_messages, 10);
        assert!(!config.chat.generate_opening_question);
        assert_eq!(config.sandbox.max_code_chars, 10_000);
        assert_eq!(config.sandbox.user, "65534:65534");
        config.validate().unwrap();
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "server": { "port": 8080 },
            "provider": { "kind": "OpenAI", "model": "gpt-4o" },
            "chat": { "replayLimit": 5, "generateOpeningQuestion": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.provider.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.chat.replay_limit, 5);
        assert!(config.chat.generate_opening_question);
        assert_eq!(config.chat.context_messages, 10);
    }

    #[test]
    fn test_api_key_is_never_read_from_file() {
        let json = r#"{ "provider": { "kind": "openai", "apiKey": "sk-leaked" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.provider.api_key.is_none());

        let serialized = serde_json::to_string(&config).unwrap();
        assert!(!serialized.contains("apiKey"));
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{ "pipeline": { "maxPracticeCount": 5 } }"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.pipeline.max_practice_count, 5);
        assert_eq!(config.pipeline.max_retries, 3);
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("intervue.json");
        std::fs::write(&config_path, "{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, IntervueError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(&PathBuf::from("/nonexistent/intervue.json")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.provider.kind, ProviderKind::Mock);
    }

    #[test]
    fn test_load_from_dir_finds_intervue_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("intervue.json"),
            r#"{ "sandbox": { "timeoutSeconds": 3 } }"#,
        )
        .unwrap();

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.sandbox.timeout_seconds, 3);
        assert_eq!(config.sandbox_limits().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_provider_kind_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("intervue.json");
        std::fs::write(&config_path, r#"{ "provider": { "kind": "gemini" } }"#).unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("invalid provider 'gemini'"));
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = Config::default();
        config.chat.replay_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chat.replayLimit must be greater than 0"));

        let mut config = Config::default();
        config.server.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_cpu_share_out_of_range() {
        let mut config = Config::default();
        config.sandbox.cpu_share = 1.5;
        assert!(config.validate().is_err());
        config.sandbox.cpu_share = 0.0;
        assert!(config.validate().is_err());
        config.sandbox.cpu_share = 1.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_root_user() {
        let mut config = Config::default();
        config.sandbox.user = "0:0".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("non-root"));
    }

    #[test]
    fn test_env_overrides_select_provider_and_key() {
        let mut config = Config::default();
        config
            .apply_env_from(|name| match name {
                PROVIDER_ENV => Some("Anthropic".to_string()),
                ANTHROPIC_API_KEY_ENV => Some("sk-ant".to_string()),
                OPENAI_API_KEY_ENV => Some("sk-openai".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert_eq!(
            config.provider.api_key.as_ref().unwrap().expose_secret(),
            "sk-ant"
        );
        let provider = config.provider_config();
        assert_eq!(provider.kind, ProviderKind::Anthropic);
        assert_eq!(provider.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_env_unknown_provider_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(|name| (name == PROVIDER_ENV).then(|| "gemini".to_string()))
            .unwrap_err();
        assert!(matches!(err, IntervueError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_mock_provider_ignores_keys() {
        let mut config = Config::default();
        config
            .apply_env_from(|name| (name == OPENAI_API_KEY_ENV).then(|| "sk".to_string()))
            .unwrap();
        assert!(config.provider.api_key.is_none());
    }
}
