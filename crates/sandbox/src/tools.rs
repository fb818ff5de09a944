//! Agent-facing execution tool.
//!
//! Thin adapter over a [`Sandbox`]: extracts and validates the tool
//! arguments, applies the configured default timeout, and renders the
//! structured result (or an infrastructure failure) as compact text the
//! calling agent can act on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use cellbox_core::{Error, Result, SandboxConfig, Tool, ToolOutput, DEFAULT_LANGUAGE};

use crate::engine::Sandbox;
use crate::types::{ExecutionRequest, ExecutionResult};

/// Tool for executing code snippets inside the configured sandbox backend.
pub struct CodeExecutionTool {
    sandbox: Arc<dyn Sandbox>,
    config: SandboxConfig,
}

impl CodeExecutionTool {
    /// Create a new execution tool over a backend.
    pub fn new(sandbox: Arc<dyn Sandbox>, config: SandboxConfig) -> Self {
        Self { sandbox, config }
    }
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute a code snippet in an isolated sandbox and return its \
         exit code, stdout and stderr. The snippet runs with a hard \
         wall-clock timeout and capped output; it cannot affect the host."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code snippet to execute"
                },
                "language": {
                    "type": "string",
                    "description": "Language tag from the configured language table",
                    "default": DEFAULT_LANGUAGE
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Wall-clock timeout in seconds (default: configured value)"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_request("code is required"))?;

        let language = args
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_LANGUAGE);

        let timeout = match args.get("timeout_secs") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let secs = value.as_i64().ok_or_else(|| {
                    Error::invalid_request("timeout_secs must be an integer")
                })?;
                if secs <= 0 {
                    return Err(Error::invalid_request("timeout_secs must be positive"));
                }
                Some(Duration::from_secs(secs as u64))
            }
        };

        let request = ExecutionRequest::new(code, language)
            .with_timeout(timeout.unwrap_or_else(|| self.config.default_timeout()));

        match self.sandbox.execute(request).await {
            Ok(result) => Ok(render_result(&result)),
            // Caller mistakes propagate; the agent framework reports them.
            Err(err @ Error::InvalidRequest(_)) | Err(err @ Error::UnsupportedLanguage(_)) => {
                Err(err)
            }
            // Infrastructure failures become a short diagnostic, never a
            // raw unhandled error on the agent surface.
            Err(err) => {
                warn!(backend = self.sandbox.backend(), "sandbox infrastructure failure: {err}");
                Ok(ToolOutput::error(format!("Sandbox unavailable: {err}"))
                    .with_data(json!({ "infrastructure_error": true })))
            }
        }
    }
}

/// Compact, agent-readable rendering of an execution result.
fn render_result(result: &ExecutionResult) -> ToolOutput {
    let data = json!({
        "exit_code": result.exit_code,
        "duration_ms": result.duration.as_millis() as u64,
        "backend": result.meta.get("backend").cloned().unwrap_or(Value::Null),
        "timed_out": result.timed_out(),
    });

    if result.timed_out() {
        return ToolOutput::error(format!(
            "Execution timed out after {:.1}s.\nPartial stdout:\n{}\nPartial stderr:\n{}",
            result.duration.as_secs_f64(),
            result.stdout,
            result.stderr
        ))
        .with_data(data);
    }

    let mut output = String::new();
    if !result.stdout.is_empty() {
        output.push_str(&result.stdout);
    }
    if !result.stderr.is_empty() {
        if !output.is_empty() {
            output.push_str("\n--- stderr ---\n");
        }
        output.push_str(&result.stderr);
    }
    if output.is_empty() {
        output = format!("Process exited with code {}", result.exit_code);
    }

    if result.success() {
        ToolOutput::text(output).with_data(data)
    } else {
        ToolOutput::error(format!(
            "Process failed (exit code {}):\n{}",
            result.exit_code, output
        ))
        .with_data(data)
    }
}
