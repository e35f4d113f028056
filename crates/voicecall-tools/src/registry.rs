use std::sync::Arc;

use voicecall_flow::Phase;
use voicecall_llm::ToolDefinition;

use crate::context::ToolContext;
use crate::news_cache::NewsCache;
use crate::tool::Tool;
use crate::tools::{
    GetNewsTool, MarkReminderAcknowledgedTool, SaveImportantDetailTool, SearchMemoriesTool,
    TransitionTool,
};

/// Builds every known tool, closed over the session's `ToolContext`. The
/// phase gate (`for_phase`) decides which of these are exposed to the LLM on
/// any given turn (§4.7's per-phase tool table).
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(ctx: Arc<dyn ToolContext>, news_cache: Arc<NewsCache>) -> Self {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(SearchMemoriesTool::new(ctx.clone())),
            Box::new(GetNewsTool::new(ctx.clone(), news_cache)),
            Box::new(SaveImportantDetailTool::new(ctx.clone())),
            Box::new(MarkReminderAcknowledgedTool::new(ctx.clone())),
            Box::new(TransitionTool::to_main(ctx.clone())),
            Box::new(TransitionTool::to_winding_down(ctx.clone())),
            Box::new(TransitionTool::to_closing(ctx)),
        ];
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Tools enabled for `phase`, in the order the registry was built.
    pub fn for_phase(&self, phase: Phase) -> Vec<&dyn Tool> {
        self.tools
            .iter()
            .filter(|t| phase.allows_tool(t.name()))
            .map(|t| t.as_ref())
            .collect()
    }

    /// API-level tool definitions for the given phase, ready to attach to a
    /// `ChatRequest`.
    pub fn definitions_for_phase(&self, phase: Phase) -> Vec<ToolDefinition> {
        self.for_phase(phase)
            .into_iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use voicecall_core::types::{DeliveryStatus, MemoryCategory};

    use super::*;

    struct NoopContext;

    #[async_trait]
    impl ToolContext for NoopContext {
        async fn search_memories(&self, _query: &str) -> Result<Vec<String>, String> {
            Ok(vec![])
        }
        async fn get_news(&self, _topic: &str) -> Result<Vec<String>, String> {
            Ok(vec![])
        }
        async fn save_important_detail(
            &self,
            _detail: &str,
            _category: MemoryCategory,
        ) -> Result<(), String> {
            Ok(())
        }
        async fn mark_reminder_acknowledged(
            &self,
            _reminder_id: &str,
            _status: DeliveryStatus,
            _user_response: Option<String>,
        ) -> Result<bool, String> {
            Ok(true)
        }
        fn request_transition(&self, _target: Phase) -> bool {
            true
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(NoopContext), Arc::new(NewsCache::new()))
    }

    #[test]
    fn opening_phase_hides_reminder_and_news_tools() {
        let reg = registry();
        let names: Vec<&str> = reg.for_phase(Phase::Opening).iter().map(|t| t.name()).collect();
        assert!(names.contains(&"search_memories"));
        assert!(names.contains(&"transition_to_main"));
        assert!(!names.contains(&"get_news"));
    }

    #[test]
    fn closing_phase_only_allows_acknowledgment() {
        let reg = registry();
        let names: Vec<&str> = reg.for_phase(Phase::Closing).iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["mark_reminder_acknowledged"]);
    }

    #[tokio::test]
    async fn unknown_detail_field_errors_without_touching_context() {
        let reg = registry();
        let tool = reg.get("save_important_detail").unwrap();
        let result = tool.execute(Value::Null).await;
        assert!(result.is_error);
    }
}
