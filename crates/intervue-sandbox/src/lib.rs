//! Intervue Code Execution Sandbox
//!
//! Runs short, untrusted programs inside throwaway Docker containers via
//! bollard, under hard memory, CPU, process, time and network limits.
//!
//! Only [`SandboxError::UnsupportedLanguage`] and [`SandboxError::CodeTooLarge`]
//! ever reach callers of [`CodeRunner::execute`]. Every infrastructure failure
//! is folded into a deterministic [`ExecutionResult`].

pub mod docker;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use docker::DockerSandbox;

/// Conventional exit code reported when the wall-clock limit is hit.
pub const TIMEOUT_EXIT_CODE: i64 = 124;

/// Exit code reported when the isolation backend cannot be used.
pub const UNAVAILABLE_EXIT_CODE: i64 = -1;

/// Mount point of the source directory inside every sandbox.
pub const SANDBOX_DIR: &str = "/sandbox";

/// Errors that can occur during sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The requested language has no runtime image.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Source exceeds the configured size cap.
    #[error("code is {len} characters; the limit is {max}")]
    CodeTooLarge {
        /// Submitted length in characters.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Docker API error.
    #[error("docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    /// Failure preparing the ephemeral workspace.
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    /// Pulling the image or creating the container took too long.
    #[error("{stage} did not finish within {secs}s")]
    SetupTimeout {
        /// Step that stalled.
        stage: &'static str,
        /// Allowed seconds.
        secs: u64,
    },

    /// The task driving the run panicked or was aborted.
    #[error("sandbox run aborted: {0}")]
    Aborted(String),

    /// The container ended without reporting an exit status.
    #[error("container wait ended without an exit status")]
    MissingExitStatus,
}

impl SandboxError {
    /// Returns `true` for failures of the isolation layer itself, as opposed
    /// to problems with the caller's request.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedLanguage(_) | Self::CodeTooLarge { .. }
        )
    }
}

/// Languages with a sandbox runtime image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// `CPython` 3.11.
    Python,
    /// Node.js 20.
    JavaScript,
    /// Ruby 3.3.
    Ruby,
    /// Bash 5.
    Bash,
}

impl Language {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Ruby => "ruby",
            Self::Bash => "bash",
        }
    }

    /// Runtime image for this language.
    #[must_use]
    pub const fn image(self) -> &'static str {
        match self {
            Self::Python => "python:3.11-slim",
            Self::JavaScript => "node:20-slim",
            Self::Ruby => "ruby:3.3-slim",
            Self::Bash => "bash:5",
        }
    }

    /// Name of the source file written into the sandbox directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Python => "main.py",
            Self::JavaScript => "main.js",
            Self::Ruby => "main.rb",
            Self::Bash => "main.sh",
        }
    }

    /// Command that runs the source file inside the container.
    #[must_use]
    pub fn command(self) -> Vec<String> {
        let interpreter = match self {
            Self::Python => "python3",
            Self::JavaScript => "node",
            Self::Ruby => "ruby",
            Self::Bash => "bash",
        };
        vec![
            interpreter.to_string(),
            format!("{SANDBOX_DIR}/{}", self.file_name()),
        ]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Self::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Self::JavaScript),
            "ruby" | "rb" => Ok(Self::Ruby),
            "bash" | "sh" => Ok(Self::Bash),
            _ => Err(SandboxError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Per-execution resource limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Wall-clock limit before the container is killed.
    pub timeout: Duration,
    /// Memory ceiling (swap is pinned to the same value).
    pub memory_mb: u64,
    /// Fraction of one CPU core.
    pub cpu_share: f64,
    /// Maximum source length in characters.
    pub max_code_chars: usize,
    /// Maximum number of processes inside the container.
    pub pids_limit: i64,
    /// Non-root `uid:gid` the program runs as.
    pub user: String,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            memory_mb: 512,
            cpu_share: 0.5,
            max_code_chars: 10_000,
            pids_limit: 64,
            user: "65534:65534".to_string(),
        }
    }
}

impl SandboxLimits {
    /// Rejects source longer than `max_code_chars`.
    pub fn check_code(&self, source: &str) -> Result<(), SandboxError> {
        let len = source.chars().count();
        if len > self.max_code_chars {
            return Err(SandboxError::CodeTooLarge {
                len,
                max: self.max_code_chars,
            });
        }
        Ok(())
    }
}

/// Captured outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code; 124 on timeout, -1 when the sandbox was unavailable.
    pub exit_code: i64,
    /// Wall-clock run time.
    pub execution_time_ms: u64,
    /// Peak memory observed while the program ran.
    pub memory_used_mb: f64,
    /// Whether the run was killed for exceeding the time limit.
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Result reported when the isolation backend failed.
    #[must_use]
    pub fn unavailable(cause: impl std::fmt::Display) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Sandbox unavailable: {cause}"),
            exit_code: UNAVAILABLE_EXIT_CODE,
            execution_time_ms: 0,
            memory_used_mb: 0.0,
            timed_out: false,
        }
    }
}

/// Runs source code in some isolation backend.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Executes `source` as `language`.
    ///
    /// Fails only for [`SandboxError::CodeTooLarge`]; infrastructure
    /// problems produce an [`ExecutionResult::unavailable`] result.
    async fn execute(&self, source: &str, language: Language)
        -> Result<ExecutionResult, SandboxError>;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> Result<(), SandboxError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_case_insensitively_with_aliases() {
        assert_eq!("Python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("JS".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("node".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("ruby".parse::<Language>().unwrap(), Language::Ruby);
        assert_eq!("BASH".parse::<Language>().unwrap(), Language::Bash);
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let err = "cobol".parse::<Language>().unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage(ref l) if l == "cobol"));
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn language_serializes_to_canonical_name() {
        assert_eq!(
            serde_json::to_string(&Language::JavaScript).unwrap(),
            r#""javascript""#
        );
        let lang: Language = serde_json::from_str(r#""Py""#).unwrap();
        assert_eq!(lang, Language::Python);
    }

    #[test]
    fn language_command_points_into_sandbox_dir() {
        assert_eq!(Language::Python.command(), vec!["python3", "/sandbox/main.py"]);
        assert_eq!(Language::JavaScript.command(), vec!["node", "/sandbox/main.js"]);
        assert_eq!(Language::Python.image(), "python:3.11-slim");
    }

    #[test]
    fn limits_default_values() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.timeout, Duration::from_secs(10));
        assert_eq!(limits.memory_mb, 512);
        assert!((limits.cpu_share - 0.5).abs() < f64::EPSILON);
        assert_eq!(limits.max_code_chars, 10_000);
        assert_eq!(limits.user, "65534:65534");
    }

    #[test]
    fn check_code_counts_characters() {
        let limits = SandboxLimits {
            max_code_chars: 3,
            ..SandboxLimits::default()
        };
        assert!(limits.check_code("ééé").is_ok());
        let err = limits.check_code("abcd").unwrap_err();
        assert!(matches!(err, SandboxError::CodeTooLarge { len: 4, max: 3 }));
    }

    #[test]
    fn unavailable_result_is_deterministic() {
        let result = ExecutionResult::unavailable("connection refused");
        assert_eq!(result.exit_code, UNAVAILABLE_EXIT_CODE);
        assert_eq!(result.stderr, "Sandbox unavailable: connection refused");
        assert!(!result.timed_out);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn setup_timeout_is_infrastructure() {
        let err = SandboxError::SetupTimeout {
            stage: "image pull",
            secs: 120,
        };
        assert!(err.is_infrastructure());
        assert_eq!(err.to_string(), "image pull did not finish within 120s");
    }
}
