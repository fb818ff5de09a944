//! Data model for sandboxed executions.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cellbox_core::{Error, Result};

/// Sentinel exit code reported when the payload was killed at the timeout
/// ceiling (or terminated in a way the host could not decode).
///
/// Real processes exit with `0..=255`, and signal deaths are mapped to
/// `128 + signal`, so the sentinel cannot collide with a genuine status.
pub const TIMEOUT_EXIT_CODE: i64 = -1;

/// Marker appended to a captured stream that hit the output cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

// =============================================================================
// Execution Request
// =============================================================================

/// One snippet of untrusted code to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The payload source text.
    pub code: String,

    /// Language tag, resolved against the configured language table.
    pub language: String,

    /// Per-call wall-clock ceiling; `None` uses the configured default.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    /// Create a request with the default timeout.
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            timeout: None,
        }
    }

    /// Override the wall-clock ceiling for this call only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject malformed requests before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(Error::invalid_request("code must not be empty"));
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(Error::invalid_request("timeout must be positive"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Execution Result
// =============================================================================

/// Structured outcome of one sandboxed run.
///
/// Always produced for payload misbehavior; see the crate docs for the
/// payload-vs-infrastructure error split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process/container exit status, or [`TIMEOUT_EXIT_CODE`].
    pub exit_code: i64,

    /// Captured standard output, capped per configuration.
    pub stdout: String,

    /// Captured standard error, capped per configuration.
    pub stderr: String,

    /// Wall clock from dispatch to completion or kill.
    pub duration: Duration,

    /// Backend-specific diagnostics: `backend`, `timed_out`,
    /// `stdout_truncated`/`stderr_truncated`, `container_id`, `oom_killed`.
    pub meta: HashMap<String, serde_json::Value>,
}

impl ExecutionResult {
    /// Create a result with empty metadata.
    pub fn new(
        exit_code: i64,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration,
            meta: HashMap::new(),
        }
    }

    /// Record a diagnostic field.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Whether the payload completed with exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Whether the payload was killed at the timeout ceiling.
    pub fn timed_out(&self) -> bool {
        self.meta
            .get("timed_out")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

// =============================================================================
// Capped Output Buffers
// =============================================================================

/// Accumulator that keeps only the first `cap` bytes of a stream while
/// counting everything, so producers are drained rather than blocked.
#[derive(Debug)]
pub(crate) struct CappedBuffer {
    cap: usize,
    buf: Vec<u8>,
    total: u64,
}

impl CappedBuffer {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: Vec::new(),
            total: 0,
        }
    }

    /// Append a chunk, discarding anything past the cap.
    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if self.buf.len() < self.cap {
            let take = (self.cap - self.buf.len()).min(chunk.len());
            self.buf.extend_from_slice(&chunk[..take]);
        }
    }

    /// Convert into the captured text plus a truncation flag; the marker is
    /// appended when anything was dropped.
    pub(crate) fn finish(self) -> (String, bool) {
        let truncated = self.total > self.buf.len() as u64;
        let mut text = String::from_utf8_lossy(&self.buf).into_owned();
        if truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        (text, truncated)
    }
}
