//! Docker container backend.
//!
//! One ephemeral container per call, never reused, so no execution's state
//! can leak into another's. The scratch directory is bind-mounted
//! read-write at a fixed path; everything else the payload sees is the
//! image's read-only rootfs. Network is off unless configured, CPU and
//! memory are capped through the container runtime, and the payload runs as
//! a non-root user with all capabilities dropped.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cellbox_core::{Error, LanguageSpec, Result, SandboxConfig};

use crate::engine::Sandbox;
use crate::local::create_scratch_dir;
use crate::types::{CappedBuffer, ExecutionRequest, ExecutionResult, TIMEOUT_EXIT_CODE};

/// Fixed mount point for the per-call scratch directory.
const WORKDIR: &str = "/workspace";

/// Standard cgroup CPU accounting period, in microseconds.
const CPU_PERIOD_USEC: i64 = 100_000;

/// Runs payloads in per-call Docker containers via the `bollard` client.
pub struct ContainerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl ContainerSandbox {
    /// Create a container backend connected to the local Docker daemon.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            Error::backend_unavailable(format!("cannot connect to Docker daemon: {e}"))
        })?;
        Ok(Self { docker, config })
    }

    /// Make sure the configured image is present, pulling it if needed.
    ///
    /// The first call after process start pays this cost; the caller's
    /// timeout covers it.
    async fn ensure_image(&self) -> Result<()> {
        let image = &self.config.container.image;
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => {
                return Err(Error::backend_unavailable(format!(
                    "failed to inspect image '{image}': {e}"
                )))
            }
        }

        info!(image = %image, "pulling payload image");
        let options = CreateImageOptions {
            from_image: image.clone(),
            ..Default::default()
        };
        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull_stream.next().await {
            progress.map_err(|e| {
                Error::backend_unavailable(format!("failed to pull image '{image}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Create and start the payload container; the returned guard owns its
    /// removal.
    async fn provision(
        &self,
        name: &str,
        scratch: &Path,
        language: &LanguageSpec,
        script_name: &str,
    ) -> Result<(ContainerGuard, String)> {
        self.ensure_image().await?;

        let container_config = Config {
            image: Some(self.config.container.image.clone()),
            cmd: Some(container_command(language, script_name)),
            working_dir: Some(WORKDIR.to_string()),
            user: Some(self.config.container.user.clone()),
            host_config: Some(build_host_config(&self.config, scratch)),
            labels: Some(HashMap::from([(
                "managed-by".to_string(),
                "cellbox".to_string(),
            )])),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name,
                    platform: None,
                }),
                container_config,
            )
            .await
            .map_err(|e| {
                Error::backend_unavailable(format!("failed to create payload container: {e}"))
            })?;
        let guard = ContainerGuard::new(self.docker.clone(), name.to_string());

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                Error::backend_unavailable(format!("failed to start payload container: {e}"))
            })?;

        debug!(container = %name, image = %self.config.container.image, "payload container started");
        Ok((guard, created.id))
    }

    /// Demux the container log into capped stdout/stderr strings.
    async fn collect_logs(&self, name: &str, cap: usize) -> (String, bool, String, bool) {
        let mut stdout = CappedBuffer::new(cap);
        let mut stderr = CappedBuffer::new(cap);

        let mut stream = self.docker.logs(
            name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) => stdout.extend(&message),
                Ok(LogOutput::StdErr { message }) => stderr.extend(&message),
                Ok(_) => {}
                Err(e) => {
                    warn!(container = %name, "failed reading container logs: {e}");
                    break;
                }
            }
        }

        let (out, out_truncated) = stdout.finish();
        let (err, err_truncated) = stderr.finish();
        (out, out_truncated, err, err_truncated)
    }
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    fn backend(&self) -> &'static str {
        "container"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;
        let language = self.config.language(&request.language)?;
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let cap = self.config.max_output_bytes();

        self.docker.ping().await.map_err(|e| {
            Error::backend_unavailable(format!("Docker daemon unreachable: {e}"))
        })?;

        let scratch = create_scratch_dir(&self.config)?;
        // Bind-mounted content must be readable by the non-root container
        // user; tempfile creates 0700 directories.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(scratch.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(|e| Error::setup(format!("failed to relax scratch permissions: {e}")))?;
        }
        let script_name = format!("snippet-{}.{}", Uuid::new_v4(), language.extension);
        tokio::fs::write(scratch.path().join(&script_name), request.code.as_bytes())
            .await
            .map_err(|e| Error::setup(format!("failed to write payload script: {e}")))?;

        let name = format!("cellbox-exec-{}", Uuid::new_v4());
        let started = Instant::now();
        let deadline = tokio::time::Instant::from_std(started + timeout);

        // The timeout budget covers setup too, image pull included.
        let provisioned = tokio::time::timeout_at(
            deadline,
            self.provision(&name, scratch.path(), &language, &script_name),
        )
        .await;
        let (guard, container_id) = match provisioned {
            Ok(Ok(provisioned)) => provisioned,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(container = %name, "setup exceeded the timeout budget");
                // The create call may have landed server-side; sweep by name.
                tokio::spawn(remove_container(self.docker.clone(), name.clone()));
                return Ok(ExecutionResult::new(
                    TIMEOUT_EXIT_CODE,
                    "",
                    "",
                    started.elapsed(),
                )
                .with_meta("backend", "container")
                .with_meta("timed_out", true)
                .with_meta("stdout_truncated", false)
                .with_meta("stderr_truncated", false));
            }
        };

        let mut wait_stream = self
            .docker
            .wait_container(&name, None::<WaitContainerOptions<String>>);
        let waited = tokio::select! {
            item = wait_stream.next() => Some(item),
            _ = tokio::time::sleep_until(deadline) => None,
        };
        drop(wait_stream);
        let duration = started.elapsed();

        let (exit_code, timed_out) = match waited {
            Some(Some(Ok(response))) => (response.status_code, false),
            // bollard reports nonzero container exits through the error
            // channel of the wait stream.
            Some(Some(Err(DockerError::DockerContainerWaitError { code, .. }))) => (code, false),
            Some(Some(Err(e))) => {
                guard.remove().await;
                return Err(Error::internal(format!(
                    "failed waiting on payload container: {e}"
                )));
            }
            Some(None) => {
                guard.remove().await;
                return Err(Error::internal("container wait stream ended unexpectedly"));
            }
            None => {
                warn!(
                    container = %name,
                    timeout_secs = timeout.as_secs(),
                    "payload exceeded timeout, killing container"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&name, Some(KillContainerOptions { signal: "SIGKILL" }))
                    .await
                {
                    warn!(container = %name, "failed to kill timed-out container: {e}");
                }
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        // Partial output survives the kill path: logs are fetched between
        // kill and remove.
        let (stdout, stdout_truncated, stderr, stderr_truncated) =
            self.collect_logs(&name, cap).await;

        let oom_killed = self
            .docker
            .inspect_container(&name, None)
            .await
            .ok()
            .and_then(|inspected| inspected.state)
            .and_then(|state| state.oom_killed)
            .unwrap_or(false);

        guard.remove().await;

        debug!(
            container = %name,
            exit_code,
            timed_out,
            elapsed_ms = duration.as_millis() as u64,
            "payload container finished"
        );

        let mut result = ExecutionResult::new(exit_code, stdout, stderr, duration)
            .with_meta("backend", "container")
            .with_meta("container_id", container_id)
            .with_meta("timed_out", timed_out)
            .with_meta("stdout_truncated", stdout_truncated)
            .with_meta("stderr_truncated", stderr_truncated);
        if oom_killed {
            result = result.with_meta("oom_killed", true);
        }
        Ok(result)
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

/// Interpreter argv with the mounted script path appended.
fn container_command(language: &LanguageSpec, script_name: &str) -> Vec<String> {
    let mut cmd = language.argv.clone();
    cmd.push(format!("{WORKDIR}/{script_name}"));
    cmd
}

/// Resource limits and hardening for the payload container.
fn build_host_config(config: &SandboxConfig, scratch: &Path) -> HostConfig {
    let container = &config.container;
    let memory = container.memory_limit_bytes();
    HostConfig {
        binds: Some(vec![format!("{}:{}", scratch.display(), WORKDIR)]),
        memory: Some(memory),
        // Pin swap to the memory limit so the cap cannot be dodged.
        memory_swap: Some(memory),
        cpu_quota: Some((container.cpu_limit * CPU_PERIOD_USEC as f64) as i64),
        cpu_period: Some(CPU_PERIOD_USEC),
        network_mode: Some(container.network_mode().to_string()),
        readonly_rootfs: Some(true),
        cap_drop: Some(vec!["ALL".to_string()]),
        security_opt: Some(vec!["no-new-privileges:true".to_string()]),
        pids_limit: Some(128),
        ..Default::default()
    }
}

async fn remove_container(docker: Docker, name: String) {
    if let Err(e) = docker
        .remove_container(
            &name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        warn!(container = %name, "failed to remove payload container: {e}");
    }
}

/// Owns removal of a payload container. The explicit `remove` call is the
/// normal path; `Drop` covers early returns by scheduling the removal.
struct ContainerGuard {
    docker: Docker,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, name: String) -> Self {
        Self {
            docker,
            name,
            armed: true,
        }
    }

    async fn remove(mut self) {
        self.armed = false;
        remove_container(self.docker.clone(), std::mem::take(&mut self.name)).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker = self.docker.clone();
        let name = std::mem::take(&mut self.name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(remove_container(docker, name));
        }
    }
}
