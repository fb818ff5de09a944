//! Tool interface for the agent-facing surface.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::ToolOutput;

/// Tool interface for atomic operations exposed to a calling agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool.
    fn name(&self) -> &str;

    /// Get the human-readable description.
    fn description(&self) -> &str;

    /// Get the JSON Schema for parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}
