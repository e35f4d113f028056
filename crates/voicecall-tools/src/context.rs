use async_trait::async_trait;

use voicecall_core::types::{DeliveryStatus, MemoryCategory};
use voicecall_flow::Phase;

/// Session state the tools are closed over. The session orchestrator
/// implements this once per call; every tool call goes through it instead of
/// touching storage directly, so handlers stay testable in isolation.
#[async_trait]
pub trait ToolContext: Send + Sync {
    async fn search_memories(&self, query: &str) -> Result<Vec<String>, String>;

    async fn get_news(&self, topic: &str) -> Result<Vec<String>, String>;

    async fn save_important_detail(
        &self,
        detail: &str,
        category: MemoryCategory,
    ) -> Result<(), String>;

    async fn mark_reminder_acknowledged(
        &self,
        reminder_id: &str,
        status: DeliveryStatus,
        user_response: Option<String>,
    ) -> Result<bool, String>;

    /// Request a flow transition. Returns whether it was legal and applied.
    fn request_transition(&self, target: Phase) -> bool;
}
