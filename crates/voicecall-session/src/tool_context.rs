use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use voicecall_core::types::{DeliveryStatus, MemoryCategory};
use voicecall_flow::Phase;
use voicecall_memory::{MemoryManager, MemorySource};
use voicecall_scheduler::ReminderStore;
use voicecall_tools::ToolContext;

use crate::news::NewsProvider;

/// `ToolContext` closed over one call's state (§4.6). Constructed once at
/// session startup and shared by every tool in the registry.
pub struct SessionToolContext {
    tenant_id: String,
    memory: Arc<MemoryManager>,
    news: Arc<dyn NewsProvider>,
    reminder_store: Option<Arc<ReminderStore>>,
    active_delivery_id: Option<String>,
    phase: Mutex<Phase>,
    saved_details: Mutex<Vec<(String, MemoryCategory)>>,
}

impl SessionToolContext {
    pub fn new(
        tenant_id: impl Into<String>,
        memory: Arc<MemoryManager>,
        news: Arc<dyn NewsProvider>,
        reminder_store: Option<Arc<ReminderStore>>,
        active_delivery_id: Option<String>,
        initial_phase: Phase,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            memory,
            news,
            reminder_store,
            active_delivery_id,
            phase: Mutex::new(initial_phase),
            saved_details: Mutex::new(Vec::new()),
        }
    }

    /// Current phase as last requested by `request_transition` or advanced
    /// externally by the turn loop (Director force-actions, hard caps).
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    pub fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap() = phase;
    }

    /// Details saved via `save_important_detail` this call, for the
    /// post-call daily-context upsert (§4.13 step 4).
    pub fn take_saved_details(&self) -> Vec<(String, MemoryCategory)> {
        std::mem::take(&mut self.saved_details.lock().unwrap())
    }
}

#[async_trait]
impl ToolContext for SessionToolContext {
    async fn search_memories(&self, query: &str) -> Result<Vec<String>, String> {
        let hits = self
            .memory
            .search(&self.tenant_id, query, None, None)
            .await
            .map_err(|e| e.to_string())?;
        Ok(hits.into_iter().map(|h| h.memory.content).collect())
    }

    async fn get_news(&self, topic: &str) -> Result<Vec<String>, String> {
        self.news.headlines(topic).await.map_err(|e| e.to_string())
    }

    async fn save_important_detail(&self, detail: &str, category: MemoryCategory) -> Result<(), String> {
        self.memory
            .store(&self.tenant_id, category.into(), detail, MemorySource::ToolCall, 50)
            .await
            .map_err(|e| e.to_string())?;
        self.saved_details.lock().unwrap().push((detail.to_string(), category));
        Ok(())
    }

    async fn mark_reminder_acknowledged(
        &self,
        _reminder_id: &str,
        status: DeliveryStatus,
        user_response: Option<String>,
    ) -> Result<bool, String> {
        let (Some(store), Some(delivery_id)) = (&self.reminder_store, &self.active_delivery_id) else {
            return Err("no reminder is pending acknowledgment on this call".to_string());
        };
        store
            .mark_acknowledged(delivery_id, status, user_response.as_deref())
            .map_err(|e| e.to_string())
    }

    fn request_transition(&self, target: Phase) -> bool {
        let mut phase = self.phase.lock().unwrap();
        let next = phase.transition(target);
        let applied = next != *phase;
        *phase = next;
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use voicecall_llm::{ChatRequest, ChatResponse, EmbeddingProvider, LlmProvider, ProviderError};

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct FakeLlm;

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "[]".to_string(),
                model: "fake".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct FakeNews;

    #[async_trait]
    impl NewsProvider for FakeNews {
        async fn headlines(&self, _topic: &str) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["it's sunny".to_string()])
        }
    }

    fn ctx() -> SessionToolContext {
        let conn = Connection::open_in_memory().unwrap();
        voicecall_memory::init_db(&conn).unwrap();
        let memory = Arc::new(MemoryManager::new(conn, Arc::new(FakeEmbedder), Arc::new(FakeLlm), "fake-model"));
        SessionToolContext::new("tenant-1", memory, Arc::new(FakeNews), None, None, Phase::Opening)
    }

    #[tokio::test]
    async fn saving_a_detail_is_recorded_for_daily_context() {
        let c = ctx();
        c.save_important_detail("likes jazz", MemoryCategory::Preference).await.unwrap();
        let saved = c.take_saved_details();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "likes jazz");
    }

    #[tokio::test]
    async fn ack_without_an_active_reminder_errors() {
        let c = ctx();
        let result = c.mark_reminder_acknowledged("r1", DeliveryStatus::Acknowledged, None).await;
        assert!(result.is_err());
    }

    #[test]
    fn transition_to_illegal_phase_is_rejected() {
        let c = ctx();
        assert!(!c.request_transition(Phase::Ended));
        assert_eq!(c.phase(), Phase::Opening);
        assert!(c.request_transition(Phase::Main));
        assert_eq!(c.phase(), Phase::Main);
    }
}
