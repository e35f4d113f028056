use serde::{Deserialize, Serialize};

use crate::prompt::SystemPrompt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to the voice/director/analysis LLM.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Plain text system prompt (used when `system_prompt` is absent).
    pub system: String,
    /// 3-tier prompt with cache breakpoints (used by the voice LLM).
    pub system_prompt: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Tools exposed for this turn. Empty when the current phase disables tools.
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages built by the tool-dispatch loop (tool_use/tool_result
    /// content blocks that don't fit the plain `Message` shape). Overrides
    /// `messages` when set.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens,
            stream: false,
            tools: Vec::new(),
            raw_messages: None,
        }
    }
}

/// Response from an LLM provider (non-streaming path).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}
