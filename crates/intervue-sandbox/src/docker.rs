//! Docker-backed sandbox.
//!
//! Each execution gets a fresh container and a fresh temporary directory.
//! The source file is bind-mounted read-only at `/sandbox`; the root
//! filesystem is read-only with a small tmpfs at `/tmp`. The container has
//! no network, no capabilities and runs as an unprivileged user. Both the
//! container and the directory are removed on every exit path, including
//! when the caller stops waiting: each run is driven by its own task.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::container::{
    Config as BollardConfig, CreateContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerWaitResponse, HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures::StreamExt;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

use crate::{
    CodeRunner, ExecutionResult, Language, SandboxError, SandboxLimits, SANDBOX_DIR,
    TIMEOUT_EXIT_CODE,
};

/// Cap on captured bytes per output stream.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Label attached to every sandbox container.
const LANGUAGE_LABEL: &str = "intervue.sandbox.language";

/// Default limit on pulling a runtime image.
pub const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(120);

/// Default limit on creating a container.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs code in throwaway Docker containers.
///
/// # Example
///
/// ```no_run
/// use intervue_sandbox::{CodeRunner, DockerSandbox, Language, SandboxLimits};
///
/// # async fn example() -> Result<(), intervue_sandbox::SandboxError> {
/// let sandbox = DockerSandbox::connect(SandboxLimits::default())?;
/// let result = sandbox.execute("print(1/0)", Language::Python).await?;
/// assert_ne!(result.exit_code, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    docker: Docker,
    limits: SandboxLimits,
    pull_timeout: Duration,
    create_timeout: Duration,
}

impl DockerSandbox {
    /// Creates a sandbox using the local Docker daemon defaults (Unix socket
    /// on Linux/macOS, named pipe on Windows).
    ///
    /// No connection is made until the first execution or health check.
    pub fn connect(limits: SandboxLimits) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        debug!("Docker client configured");
        Ok(Self::with_docker(docker, limits))
    }

    /// Creates a sandbox around an existing Docker client.
    #[must_use]
    pub const fn with_docker(docker: Docker, limits: SandboxLimits) -> Self {
        Self {
            docker,
            limits,
            pull_timeout: IMAGE_PULL_TIMEOUT,
            create_timeout: CREATE_TIMEOUT,
        }
    }

    /// Overrides how long an image pull and a container create may take
    /// before the run is reported unavailable.
    #[must_use]
    pub fn with_setup_timeouts(mut self, pull: Duration, create: Duration) -> Self {
        self.pull_timeout = pull;
        self.create_timeout = create;
        self
    }

    /// Limits applied to every execution.
    #[must_use]
    pub const fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Pulls `image` unless it is already present.
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image, "Pulling sandbox runtime image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let pull = self.docker.create_image(Some(options), None, None);
        tokio::pin!(pull);
        while let Some(progress) = pull.next().await {
            progress?;
        }
        Ok(())
    }

    /// Builds the container configuration for one run.
    fn container_config(&self, language: Language, source_dir: &Path) -> BollardConfig<String> {
        let memory = i64::try_from(self.limits.memory_mb.saturating_mul(1024 * 1024))
            .unwrap_or(i64::MAX);

        let host_config = HostConfig {
            mounts: Some(vec![Mount {
                source: Some(source_dir.to_string_lossy().into_owned()),
                target: Some(SANDBOX_DIR.to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(true),
                ..Default::default()
            }]),
            memory: Some(memory),
            memory_swap: Some(memory),
            nano_cpus: Some(nano_cpus(self.limits.cpu_share)),
            pids_limit: Some(self.limits.pids_limit),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            readonly_rootfs: Some(true),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                "rw,noexec,nosuid,size=64m".to_string(),
            )])),
            ..Default::default()
        };

        BollardConfig {
            image: Some(language.image().to_string()),
            cmd: Some(language.command()),
            user: Some(self.limits.user.clone()),
            working_dir: Some(SANDBOX_DIR.to_string()),
            env: Some(vec![
                "HOME=/tmp".to_string(),
                "PYTHONDONTWRITEBYTECODE=1".to_string(),
            ]),
            labels: Some(HashMap::from([(
                LANGUAGE_LABEL.to_string(),
                language.as_str().to_string(),
            )])),
            network_disabled: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Prepares the workspace, runs one container and tears both down.
    async fn run(&self, source: &str, language: Language) -> Result<ExecutionResult, SandboxError> {
        let workspace = prepare_workspace(source, language).await?;

        within(
            "image pull",
            self.pull_timeout,
            self.ensure_image(language.image()),
        )
        .await?;

        let name = format!("intervue-sandbox-{}", Uuid::new_v4());
        let create_options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };
        let create = async {
            Ok::<_, SandboxError>(self
                .docker
                .create_container(
                    Some(create_options),
                    self.container_config(language, workspace.path()),
                )
                .await?)
        };
        let response = match within("container create", self.create_timeout, create).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, SandboxError::SetupTimeout { .. }) {
                    // The daemon may still finish the create after we gave up.
                    self.remove(&name).await;
                }
                return Err(e);
            }
        };

        for warning in &response.warnings {
            warn!(container_id = %response.id, warning = %warning, "Docker warning during container creation");
        }
        debug!(container_id = %response.id, container_name = %name, "Sandbox container created");

        let outcome = self.supervise(&response.id).await;

        self.remove(&response.id).await;
        if let Err(e) = workspace.close() {
            warn!(error = %e, "Failed to remove sandbox workspace");
        }

        outcome
    }

    /// Starts the container and waits for it to exit or hit the deadline,
    /// sampling memory usage meanwhile.
    async fn supervise(&self, id: &str) -> Result<ExecutionResult, SandboxError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        let started = Instant::now();

        let deadline = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(deadline);
        let wait = self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );
        tokio::pin!(wait);
        let stats = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: true,
                one_shot: false,
            }),
        );
        tokio::pin!(stats);

        let mut stats_open = true;
        let mut peak_bytes: u64 = 0;
        let exit_code = loop {
            tokio::select! {
                () = &mut deadline => break None,
                status = wait.next() => break Some(exit_status(status)?),
                sample = stats.next(), if stats_open => match sample {
                    Some(Ok(sample)) => {
                        let usage = sample
                            .memory_stats
                            .max_usage
                            .or(sample.memory_stats.usage)
                            .unwrap_or(0);
                        peak_bytes = peak_bytes.max(usage);
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "Stats stream failed");
                        stats_open = false;
                    }
                    None => stats_open = false,
                },
            }
        };
        let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let timed_out = exit_code.is_none();
        if timed_out {
            warn!(container_id = %id, timeout_secs = self.limits.timeout.as_secs(), "Sandbox run timed out; killing container");
            if let Err(e) = self
                .docker
                .kill_container(id, None::<KillContainerOptions<String>>)
                .await
            {
                debug!(error = %e, "Kill failed; container likely exited");
            }
        }

        let (stdout, mut stderr) = self.collect_logs(id).await?;
        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "Execution timed out after {}s",
                self.limits.timeout.as_secs()
            ));
        }

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: exit_code.unwrap_or(TIMEOUT_EXIT_CODE),
            execution_time_ms,
            memory_used_mb: bytes_to_mb(peak_bytes),
            timed_out,
        })
    }

    async fn collect_logs(&self, id: &str) -> Result<(String, String), SandboxError> {
        let logs = self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        tokio::pin!(logs);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = logs.next().await {
            match chunk? {
                LogOutput::StdOut { message } => append_capped(&mut stdout, &message),
                LogOutput::StdErr { message } => append_capped(&mut stderr, &message),
                LogOutput::StdIn { .. } | LogOutput::Console { .. } => {}
            }
        }

        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    async fn remove(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => debug!(container_id = %id, "Sandbox container removed"),
            Err(e) => warn!(container_id = %id, error = %e, "Failed to remove sandbox container"),
        }
    }
}

#[async_trait]
impl CodeRunner for DockerSandbox {
    #[instrument(skip(self, source), fields(language = %language, code_chars = source.len()))]
    async fn execute(
        &self,
        source: &str,
        language: Language,
    ) -> Result<ExecutionResult, SandboxError> {
        self.limits.check_code(source)?;

        let sandbox = self.clone();
        let source = source.to_owned();
        let run = tokio::spawn(
            async move { sandbox.run(&source, language).await }.instrument(Span::current()),
        );
        let outcome = match run.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SandboxError::Aborted(e.to_string())),
        };

        match outcome {
            Ok(result) => {
                info!(
                    exit_code = result.exit_code,
                    execution_time_ms = result.execution_time_ms,
                    memory_used_mb = result.memory_used_mb,
                    timed_out = result.timed_out,
                    "Sandbox run finished"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Sandbox unavailable");
                Ok(ExecutionResult::unavailable(&e))
            }
        }
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), SandboxError> {
        self.docker.ping().await?;
        debug!("Docker daemon health check passed");
        Ok(())
    }
}

/// Writes `source` into a fresh world-readable temporary directory.
async fn prepare_workspace(source: &str, language: Language) -> Result<TempDir, SandboxError> {
    let dir = tempfile::Builder::new()
        .prefix("intervue-sandbox-")
        .tempdir()?;
    let file = dir.path().join(language.file_name());
    tokio::fs::write(&file, source).await?;

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(dir.path(), Permissions::from_mode(0o755)).await?;
        tokio::fs::set_permissions(&file, Permissions::from_mode(0o644)).await?;
    }

    Ok(dir)
}

/// Runs one setup step under a deadline.
async fn within<T>(
    stage: &'static str,
    limit: Duration,
    step: impl Future<Output = Result<T, SandboxError>>,
) -> Result<T, SandboxError> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| SandboxError::SetupTimeout {
            stage,
            secs: limit.as_secs(),
        })?
}

/// Maps the wait stream's first item to an exit code.
///
/// Docker reports a non-zero exit as a wait error carrying the code.
fn exit_status(
    status: Option<Result<ContainerWaitResponse, bollard::errors::Error>>,
) -> Result<i64, SandboxError> {
    match status {
        Some(Ok(response)) => Ok(response.status_code),
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(e)) => Err(e.into()),
        None => Err(SandboxError::MissingExitStatus),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn nano_cpus(cpu_share: f64) -> i64 {
    (cpu_share * 1_000_000_000.0).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn append_capped(buf: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
    buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
}
