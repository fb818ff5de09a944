//! Local subprocess backend.
//!
//! Isolation is the OS process boundary only: the payload inherits the
//! caller's user, permissions, and network. What this backend does enforce
//! is the per-call scratch directory, the wall-clock timeout (killing the
//! payload's whole process group), and the output caps.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use uuid::Uuid;

use cellbox_core::{Error, Result, SandboxConfig};

use crate::engine::Sandbox;
use crate::types::{CappedBuffer, ExecutionRequest, ExecutionResult, TIMEOUT_EXIT_CODE};

/// Create a fresh uniquely named scratch directory under the configured
/// root. Dropping the handle deletes the directory, which is what ties
/// cleanup to every exit path.
pub(crate) fn create_scratch_dir(config: &SandboxConfig) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("cellbox-");
    let created = match &config.scratch_root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    };
    created.map_err(|e| Error::setup(format!("failed to create scratch directory: {e}")))
}

/// Runs payloads as child processes in per-call scratch directories.
pub struct LocalProcessSandbox {
    config: SandboxConfig,
}

impl LocalProcessSandbox {
    /// Create a local backend over the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sandbox for LocalProcessSandbox {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;
        let language = self.config.language(&request.language)?;
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let cap = self.config.max_output_bytes();

        let scratch = create_scratch_dir(&self.config)?;
        let script_name = format!("snippet-{}.{}", Uuid::new_v4(), language.extension);
        let script_path = scratch.path().join(&script_name);
        tokio::fs::write(&script_path, request.code.as_bytes())
            .await
            .map_err(|e| Error::setup(format!("failed to write payload script: {e}")))?;

        let (program, args) = language
            .argv
            .split_first()
            .ok_or_else(|| Error::internal(format!("empty argv for language '{}'", request.language)))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(&script_path)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Fresh process group, so the timeout kill reaches children the
        // payload spawned, not just the interpreter.
        #[cfg(unix)]
        command.process_group(0);

        debug!(language = %request.language, interpreter = %program, "spawning local payload");

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::backend_unavailable(format!("interpreter '{program}' not found"))
            }
            _ => Error::setup(format!("failed to spawn interpreter '{program}': {e}")),
        })?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal("child stdout pipe missing"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::internal("child stderr pipe missing"))?;
        let stdout_task = tokio::spawn(drain(stdout_pipe, cap));
        let stderr_task = tokio::spawn(drain(stderr_pipe, cap));

        let waited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep(timeout) => None,
        };

        let (exit_code, timed_out) = match waited {
            Some(status) => (exit_status_code(&status), false),
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "payload exceeded timeout, killing process group"
                );
                kill_process_tree(&mut child).await;
                (TIMEOUT_EXIT_CODE, true)
            }
        };
        let duration = started.elapsed();

        // The pipes close once the process group is dead, so the reader
        // tasks always terminate.
        let (stdout, stdout_truncated) = stdout_task
            .await
            .unwrap_or_else(|_| CappedBuffer::new(cap))
            .finish();
        let (stderr, stderr_truncated) = stderr_task
            .await
            .unwrap_or_else(|_| CappedBuffer::new(cap))
            .finish();

        debug!(exit_code, timed_out, elapsed_ms = duration.as_millis() as u64, "local payload finished");

        Ok(ExecutionResult::new(exit_code, stdout, stderr, duration)
            .with_meta("backend", "local")
            .with_meta("timed_out", timed_out)
            .with_meta("stdout_truncated", stdout_truncated)
            .with_meta("stderr_truncated", stderr_truncated))
    }

    async fn is_available(&self) -> bool {
        create_scratch_dir(&self.config).is_ok()
    }
}

/// Read a pipe to EOF, keeping only the first `cap` bytes. Draining past
/// the cap keeps the child from blocking on a full pipe.
async fn drain<R>(mut reader: R, cap: usize) -> CappedBuffer
where
    R: AsyncRead + Unpin,
{
    let mut out = CappedBuffer::new(cap);
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => out.extend(&chunk[..n]),
            Err(e) => {
                warn!("payload stream read failed: {e}");
                break;
            }
        }
    }
    out
}

/// SIGKILL the payload's process group, then reap the child so no zombie
/// outlives the call.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!(pid, "killpg failed: {e}");
        }
    }
    // Covers non-unix targets and the window where the group id is gone.
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        warn!("failed to reap timed-out payload: {e}");
    }
}

/// Map a process exit status onto the result's exit code: verbatim codes,
/// `128 + signal` for signal deaths, sentinel otherwise.
fn exit_status_code(status: &std::process::ExitStatus) -> i64 {
    if let Some(code) = status.code() {
        return code as i64;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal as i64;
        }
    }
    TIMEOUT_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn exit_status_mapping() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        // Raw wait status: exit code lives in the high byte.
        assert_eq!(exit_status_code(&ExitStatus::from_raw(7 << 8)), 7);
        // Raw wait status: a bare signal number means the process was killed.
        assert_eq!(exit_status_code(&ExitStatus::from_raw(9)), 137);
    }

    #[test]
    fn scratch_dirs_are_unique_and_cleaned() {
        let config = SandboxConfig::default();
        let first = create_scratch_dir(&config).unwrap();
        let second = create_scratch_dir(&config).unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
        drop(second);
    }
}
