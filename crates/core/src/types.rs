//! Shared types for the tool surface.

use serde::{Deserialize, Serialize};

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool execution was successful.
    pub success: bool,

    /// Human-readable output content.
    pub content: String,

    /// Optional structured data.
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: None,
        }
    }

    /// Create a failed output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the output.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_and_error_constructors() {
        let ok = ToolOutput::text("done");
        assert!(ok.success);
        assert_eq!(ok.content, "done");
        assert!(ok.data.is_none());

        let err = ToolOutput::error("boom").with_data(json!({"exit_code": 1}));
        assert!(!err.success);
        assert_eq!(err.data.unwrap()["exit_code"], 1);
    }
}
