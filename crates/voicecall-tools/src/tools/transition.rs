use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use voicecall_flow::Phase;

use crate::context::ToolContext;
use crate::result::ToolResult;
use crate::tool::Tool;

/// The three no-argument `transition_to_*` tools (§4.6) share this shape;
/// only the name/description/target phase differ.
pub struct TransitionTool {
    ctx: Arc<dyn ToolContext>,
    name: &'static str,
    description: &'static str,
    target: Phase,
}

impl TransitionTool {
    pub fn to_main(ctx: Arc<dyn ToolContext>) -> Self {
        Self {
            ctx,
            name: "transition_to_main",
            description: "Move the call from the opening chit-chat into the main check-in.",
            target: Phase::Main,
        }
    }

    pub fn to_winding_down(ctx: Arc<dyn ToolContext>) -> Self {
        Self {
            ctx,
            name: "transition_to_winding_down",
            description: "Begin wrapping up the main conversation toward a natural goodbye.",
            target: Phase::WindingDown,
        }
    }

    pub fn to_closing(ctx: Arc<dyn ToolContext>) -> Self {
        Self {
            ctx,
            name: "transition_to_closing",
            description: "Move to the final goodbye exchange before the call ends.",
            target: Phase::Closing,
        }
    }
}

#[async_trait]
impl Tool for TransitionTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value) -> ToolResult {
        if self.ctx.request_transition(self.target) {
            ToolResult::success(format!("Moved to {:?} phase.", self.target))
        } else {
            ToolResult::error("that transition isn't available from the current phase")
        }
    }
}
