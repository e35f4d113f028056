use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::result::ToolResult;
use crate::tool::Tool;

pub struct SearchMemoriesTool {
    ctx: Arc<dyn ToolContext>,
}

impl SearchMemoriesTool {
    pub fn new(ctx: Arc<dyn ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SearchMemoriesTool {
    fn name(&self) -> &str {
        "search_memories"
    }

    fn description(&self) -> &str {
        "Search what you remember about this person from past calls — facts, \
         preferences, family, past events or concerns. Use this before asking \
         something you might already know the answer to."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for, e.g. 'grandchildren' or 'medication schedule'."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::error("'query' is required"),
        };

        match self.ctx.search_memories(query).await {
            Ok(results) if results.is_empty() => {
                ToolResult::success("No matching memories found.")
            }
            Ok(results) => ToolResult::success(results.join("\n")),
            Err(e) => ToolResult::error(format!("memory search unavailable: {e}")),
        }
    }
}
