use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::news_cache::NewsCache;
use crate::result::ToolResult;
use crate::tool::Tool;

const MAX_ITEMS: usize = 2;

pub struct GetNewsTool {
    ctx: Arc<dyn ToolContext>,
    cache: Arc<NewsCache>,
}

impl GetNewsTool {
    pub fn new(ctx: Arc<dyn ToolContext>, cache: Arc<NewsCache>) -> Self {
        Self { ctx, cache }
    }
}

#[async_trait]
impl Tool for GetNewsTool {
    fn name(&self) -> &str {
        "get_news"
    }

    fn description(&self) -> &str {
        "Look up a couple of short, current news items on a topic the senior \
         brought up. Use sparingly — this is small talk, not a briefing."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Topic to look up, e.g. 'local weather' or 'the election'."
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let topic = match input.get("topic").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t,
            _ => return ToolResult::error("'topic' is required"),
        };

        if let Some(cached) = self.cache.get(topic) {
            return ToolResult::success(format_items(&cached));
        }

        match self.ctx.get_news(topic).await {
            Ok(items) => {
                let capped: Vec<String> = items.into_iter().take(MAX_ITEMS).collect();
                self.cache.put(topic, capped.clone());
                ToolResult::success(format_items(&capped))
            }
            Err(e) => ToolResult::error(format!("couldn't find news on that right now: {e}")),
        }
    }
}

fn format_items(items: &[String]) -> String {
    if items.is_empty() {
        "Nothing notable found on that topic right now.".to_string()
    } else {
        items.join("\n")
    }
}
