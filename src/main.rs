#![deny(unused)]
//! cellbox — run untrusted code snippets under an isolation backend.
//!
//! Thin driver over the sandbox subsystem: resolve the configuration once,
//! select a backend through the factory, and push one snippet through the
//! agent-facing execution tool, exiting with the payload's status.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use cellbox_core::{SandboxConfig, Tool};
use cellbox_sandbox::{CodeExecutionTool, SandboxFactory, TIMEOUT_EXIT_CODE};

#[derive(Parser)]
#[command(
    name = "cellbox",
    version,
    about = "Run untrusted code snippets in an isolated sandbox"
)]
struct Cli {
    /// Source file to execute, or "-" to read from stdin
    #[arg(value_name = "FILE")]
    source: PathBuf,

    /// Language tag from the configured language table
    #[arg(short, long, default_value = "python")]
    language: String,

    /// Wall-clock timeout in seconds (overrides the configured default)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Backend override: local or container
    #[arg(short, long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SandboxConfig::load().context("failed to load sandbox configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let code = if cli.source.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read code from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(&cli.source)
            .with_context(|| format!("failed to read {}", cli.source.display()))?
    };

    let sandbox = SandboxFactory::new(config.clone()).get_sandbox()?;
    tracing::info!(backend = sandbox.backend(), "sandbox ready");

    let tool = CodeExecutionTool::new(Arc::clone(&sandbox), config);

    let mut args = json!({ "code": code, "language": cli.language });
    if let Some(secs) = cli.timeout {
        args["timeout_secs"] = json!(secs);
    }

    let output = tool.execute(args).await?;
    println!("{}", output.content);

    let exit_code = output
        .data
        .as_ref()
        .and_then(|data| data.get("exit_code"))
        .and_then(|value| value.as_i64())
        .unwrap_or(if output.success { 0 } else { 1 });

    // The sentinel maps to the conventional timeout status; everything else
    // is clamped into the shell's exit range.
    let status = if exit_code == TIMEOUT_EXIT_CODE {
        124
    } else {
        exit_code.clamp(0, 255) as i32
    };
    std::process::exit(status);
}
