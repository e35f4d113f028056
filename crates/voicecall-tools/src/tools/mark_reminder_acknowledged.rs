use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use voicecall_core::types::DeliveryStatus;

use crate::context::ToolContext;
use crate::result::ToolResult;
use crate::tool::Tool;

pub struct MarkReminderAcknowledgedTool {
    ctx: Arc<dyn ToolContext>,
}

impl MarkReminderAcknowledgedTool {
    pub fn new(ctx: Arc<dyn ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for MarkReminderAcknowledgedTool {
    fn name(&self) -> &str {
        "mark_reminder_acknowledged"
    }

    fn description(&self) -> &str {
        "Record that the senior acknowledged or confirmed a reminder you just \
         delivered. Safe to call again for the same reminder — repeats are no-ops."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reminder_id": { "type": "string" },
                "status": { "type": "string", "enum": ["acknowledged", "confirmed"] },
                "user_response": {
                    "type": "string",
                    "description": "Optional verbatim summary of what the senior said."
                }
            },
            "required": ["reminder_id", "status"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let reminder_id = match input.get("reminder_id").and_then(|v| v.as_str()) {
            Some(id) if !id.trim().is_empty() => id,
            _ => return ToolResult::error("'reminder_id' is required"),
        };
        let status = match input.get("status").and_then(|v| v.as_str()) {
            Some("acknowledged") => DeliveryStatus::Acknowledged,
            Some("confirmed") => DeliveryStatus::Confirmed,
            Some(other) => {
                return ToolResult::error(format!(
                    "unknown status '{other}': must be 'acknowledged' or 'confirmed'"
                ))
            }
            None => return ToolResult::error("'status' is required"),
        };
        let user_response = input
            .get("user_response")
            .and_then(|v| v.as_str())
            .map(String::from);

        match self
            .ctx
            .mark_reminder_acknowledged(reminder_id, status, user_response)
            .await
        {
            Ok(_) => ToolResult::success(format!("Reminder marked as {status}.")),
            Err(e) => ToolResult::error(format!("couldn't update that reminder: {e}")),
        }
    }
}
