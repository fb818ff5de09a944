//! The sandbox execution contract.
//!
//! Every backend implements [`Sandbox`]: one call runs one payload to
//! completion, timeout-kill, or infrastructure error, with nothing shared
//! between calls except the immutable configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cellbox_core::Result;

use crate::types::{ExecutionRequest, ExecutionResult};

/// Trait for sandbox execution backends.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Short backend name, recorded in result metadata.
    fn backend(&self) -> &'static str;

    /// Run one code snippet under the configured budgets.
    ///
    /// Enforces the hard wall-clock timeout (forcible termination with
    /// partial output capture), independent per-stream output caps, and the
    /// backend's isolation guarantees. Scratch directories and containers
    /// are disposed of on every exit path.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult>;

    /// Cheap probe: can this backend run payloads right now?
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Mock Sandbox (for testing without a backend)
// =============================================================================

/// In-memory mock backend for unit testing.
///
/// Returns queued results in order (a generic success once the queue is
/// empty) and records every request it sees so tests can assert on what the
/// adapter actually dispatched.
#[derive(Default)]
pub struct MockSandbox {
    pub responses: Arc<Mutex<Vec<ExecutionResult>>>,
    pub seen: Arc<Mutex<Vec<ExecutionRequest>>>,
}

impl MockSandbox {
    /// Create a mock backend with predefined results.
    pub fn new(responses: Vec<ExecutionResult>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            seen: Default::default(),
        }
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;
        self.seen.lock().await.push(request);

        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Ok(
                ExecutionResult::new(0, "[mock] payload executed", "", Duration::from_millis(1))
                    .with_meta("backend", "mock"),
            )
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}
