use std::sync::Arc;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{json, Value};

use voicecall_core::types::MemoryCategory;

use crate::context::ToolContext;
use crate::result::ToolResult;
use crate::tool::Tool;

pub struct SaveImportantDetailTool {
    ctx: Arc<dyn ToolContext>,
}

impl SaveImportantDetailTool {
    pub fn new(ctx: Arc<dyn ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SaveImportantDetailTool {
    fn name(&self) -> &str {
        "save_important_detail"
    }

    fn description(&self) -> &str {
        "Remember something worth recalling in a future call: a fact, a \
         preference, an upcoming event, a concern, or a relationship detail."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "detail": {
                    "type": "string",
                    "description": "The detail to remember, written as a short standalone sentence."
                },
                "category": {
                    "type": "string",
                    "enum": ["fact", "preference", "event", "concern", "relationship"]
                }
            },
            "required": ["detail", "category"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let detail = match input.get("detail").and_then(|v| v.as_str()) {
            Some(d) if !d.trim().is_empty() => d,
            _ => return ToolResult::error("'detail' is required"),
        };
        let category = match input
            .get("category")
            .and_then(|v| v.as_str())
            .map(MemoryCategory::from_str)
        {
            Some(Ok(c)) => c,
            Some(Err(e)) => return ToolResult::error(e),
            None => return ToolResult::error("'category' is required"),
        };

        match self.ctx.save_important_detail(detail, category).await {
            Ok(()) => ToolResult::success(format!("Noted: {detail}")),
            Err(e) => ToolResult::error(format!("couldn't save that right now: {e}")),
        }
    }
}
