use async_trait::async_trait;
use serde_json::Value;

use crate::result::ToolResult;

/// A tool the voice LLM can call mid-turn. Each concrete tool is closed over
/// the session's `ToolContext` at construction time.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> ToolResult;
}
