//! Sandbox integration tests.
//!
//! End-to-end coverage of the local backend (using `/bin/sh`, available on
//! any unix host) and the Tool → Sandbox pipeline. Nothing here needs a
//! Docker daemon; the daemon- and python3-dependent tests are `#[ignore]`d
//! with their prerequisite named.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cellbox_core::{Error, LanguageSpec, SandboxConfig, Tool};
use cellbox_sandbox::{
    CodeExecutionTool, ExecutionRequest, LocalProcessSandbox, Sandbox, SandboxFactory,
    TIMEOUT_EXIT_CODE, TRUNCATION_MARKER,
};

// =============================================================================
// Helpers
// =============================================================================

/// Default config extended with a `sh` language entry for host-independent
/// end-to-end runs.
fn sh_config() -> SandboxConfig {
    let mut config = SandboxConfig::default();
    config.languages.insert(
        "sh".to_string(),
        LanguageSpec {
            argv: vec!["sh".to_string()],
            extension: "sh".to_string(),
        },
    );
    config
}

fn sh_request(code: &str) -> ExecutionRequest {
    ExecutionRequest::new(code, "sh")
}

// =============================================================================
// 1. Local backend: exit codes and stream capture
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn local_captures_streams_and_exit_code() {
    let sandbox = LocalProcessSandbox::new(sh_config());

    let result = sandbox
        .execute(sh_request("echo hello; echo oops >&2; exit 3"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert!(!result.timed_out());
    assert_eq!(result.meta["backend"], "local");
}

#[cfg(unix)]
#[tokio::test]
async fn local_preserves_short_output_byte_for_byte() {
    let sandbox = LocalProcessSandbox::new(sh_config());

    let result = sandbox
        .execute(sh_request("printf 'abc'"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "abc");
    assert_eq!(result.meta["stdout_truncated"], false);
}

// =============================================================================
// 2. Timeout enforcement
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn local_timeout_kills_promptly_with_sentinel() {
    let sandbox = LocalProcessSandbox::new(sh_config());

    let result = sandbox
        .execute(sh_request("echo started; sleep 30").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out());
    assert!(result.duration >= Duration::from_secs(1));
    assert!(
        result.duration < Duration::from_secs(5),
        "kill must not wait out the payload, took {:?}",
        result.duration
    );
    // Output produced before the kill is preserved.
    assert_eq!(result.stdout, "started\n");
}

#[cfg(unix)]
#[tokio::test]
async fn local_timeout_reaches_payload_children() {
    let sandbox = LocalProcessSandbox::new(sh_config());

    // The payload hides behind a child of its own; the group kill must end
    // the call anyway.
    let result = sandbox
        .execute(sh_request("sh -c 'sleep 30' & wait").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(result.timed_out());
    assert!(result.duration < Duration::from_secs(5));
}

// =============================================================================
// 3. Output capping
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn local_truncates_runaway_output_at_the_cap() {
    let mut config = sh_config();
    config.max_output_kb = 1;
    let sandbox = LocalProcessSandbox::new(config);

    // ~40 KB of stdout against a 1 KB cap.
    let result = sandbox
        .execute(sh_request(
            "i=0; while [ $i -lt 1000 ]; do echo 0123456789012345678901234567890123456789; i=$((i+1)); done",
        ))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.len(), 1024 + TRUNCATION_MARKER.len());
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    assert_eq!(result.meta["stdout_truncated"], true);
    assert_eq!(result.meta["stderr_truncated"], false);
}

// =============================================================================
// 4. Isolation between concurrent calls
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn concurrent_runs_do_not_see_each_other() {
    let sandbox = Arc::new(LocalProcessSandbox::new(sh_config()));

    let left = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            sandbox
                .execute(sh_request("touch left_marker; sleep 1; ls"))
                .await
                .unwrap()
        })
    };
    let right = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            sandbox
                .execute(sh_request("touch right_marker; sleep 1; ls"))
                .await
                .unwrap()
        })
    };

    let (left, right) = (left.await.unwrap(), right.await.unwrap());

    assert!(left.stdout.contains("left_marker"));
    assert!(!left.stdout.contains("right_marker"));
    assert!(right.stdout.contains("right_marker"));
    assert!(!right.stdout.contains("left_marker"));
}

// =============================================================================
// 5. Scratch directory cleanup on every path
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn scratch_dirs_are_removed_after_normal_and_timeout_paths() {
    let root = tempfile::tempdir().unwrap();
    let mut config = sh_config();
    config.scratch_root = Some(root.path().to_path_buf());
    let sandbox = LocalProcessSandbox::new(config);

    sandbox.execute(sh_request("echo done")).await.unwrap();
    sandbox
        .execute(sh_request("sleep 30").with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();
    sandbox
        .execute(sh_request("exit 9"))
        .await
        .unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
    assert!(
        leftovers.is_empty(),
        "scratch directories leaked: {leftovers:?}"
    );
}

// =============================================================================
// 6. Infrastructure errors stay distinguishable
// =============================================================================

#[tokio::test]
async fn unsupported_language_is_rejected_before_spawning() {
    let sandbox = LocalProcessSandbox::new(sh_config());
    let err = sandbox
        .execute(ExecutionRequest::new("print(1)", "cobol"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedLanguage(_)));
}

#[tokio::test]
async fn missing_interpreter_is_an_infrastructure_error() {
    let mut config = sh_config();
    config.languages.insert(
        "ghost".to_string(),
        LanguageSpec {
            argv: vec!["cellbox-no-such-interpreter".to_string()],
            extension: "ghost".to_string(),
        },
    );
    let sandbox = LocalProcessSandbox::new(config);

    let err = sandbox
        .execute(ExecutionRequest::new("whatever", "ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

#[test]
fn unknown_backend_fails_fast() {
    let mut config = SandboxConfig::default();
    config.backend = "remote".to_string();
    let err = match SandboxFactory::new(config).get_sandbox() {
        Ok(_) => panic!("expected unknown backend to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, Error::UnknownBackend(_)));
}

// =============================================================================
// 7. Tool → Sandbox pipeline
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn tool_runs_payload_through_local_backend() {
    let config = sh_config();
    let sandbox = Arc::new(LocalProcessSandbox::new(config.clone()));
    let tool = CodeExecutionTool::new(sandbox, config);

    let output = tool
        .execute(json!({"code": "echo from-the-tool", "language": "sh"}))
        .await
        .unwrap();

    assert!(output.success);
    assert_eq!(output.content, "from-the-tool\n");
    assert_eq!(output.data.unwrap()["exit_code"], 0);
}

#[cfg(unix)]
#[tokio::test]
async fn tool_reports_payload_failure_without_erroring() {
    let config = sh_config();
    let sandbox = Arc::new(LocalProcessSandbox::new(config.clone()));
    let tool = CodeExecutionTool::new(sandbox, config);

    let output = tool
        .execute(json!({"code": "echo bad >&2; exit 2", "language": "sh"}))
        .await
        .unwrap();

    assert!(!output.success);
    assert!(output.content.contains("exit code 2"));
    assert!(output.content.contains("bad"));
}

// =============================================================================
// 8. Interpreter- and daemon-dependent paths
// =============================================================================

#[tokio::test]
#[ignore = "requires python3 on the host"]
async fn python_sum_example() {
    let sandbox = LocalProcessSandbox::new(SandboxConfig::default());

    let result = sandbox
        .execute(ExecutionRequest::new("print(sum(range(1, 101)))", "python"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "5050\n");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
#[ignore = "requires a Docker daemon and the configured image"]
async fn container_backend_round_trip() {
    let mut config = SandboxConfig::default();
    config.backend = "container".to_string();
    let sandbox = SandboxFactory::new(config).get_sandbox().unwrap();

    let result = sandbox
        .execute(ExecutionRequest::new("print(sum(range(1, 101)))", "python"))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "5050\n");
    assert_eq!(result.meta["backend"], "container");
    assert!(result.meta.contains_key("container_id"));
}

#[tokio::test]
#[ignore = "requires a Docker daemon and the configured image"]
async fn container_timeout_kills_and_removes() {
    let mut config = SandboxConfig::default();
    config.backend = "container".to_string();
    let sandbox = SandboxFactory::new(config).get_sandbox().unwrap();

    let result = sandbox
        .execute(
            ExecutionRequest::new("while True: pass", "python")
                .with_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out());
    assert!(result.duration < Duration::from_secs(10));
}
