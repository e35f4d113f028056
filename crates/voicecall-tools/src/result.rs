use serde::{Deserialize, Serialize};

/// Result of executing a tool call. Tool handlers never raise — a failure
/// becomes a human-readable fallback string so the voice LLM can keep
/// talking instead of the turn aborting (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}
