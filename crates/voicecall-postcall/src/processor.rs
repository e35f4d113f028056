use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, instrument};

use voicecall_conversations::{ConversationId, ConversationManager, ConversationStatus, TranscriptTurn};
use voicecall_context::{CallContextUpdate, ContextCache, DailyContextStore};
use voicecall_core::types::{CallSid, TenantId, TurnRole};
use voicecall_llm::LlmProvider;
use voicecall_memory::{MemoryManager, MemorySource};

use crate::analysis::analyze_call;

/// Everything the post-call processor needs about one finished call. The
/// session orchestrator hands this over and moves on; processing runs
/// detached (§4.13, §5 cancellation semantics).
pub struct PostCallInput {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    pub call_sid: CallSid,
    pub tenant_profile: String,
    pub transcript: Vec<TranscriptTurn>,
    pub topics_discussed: Vec<String>,
    pub delivered_reminders: Vec<String>,
    pub advice_given: Vec<String>,
    pub local_date: NaiveDate,
    pub final_status: ConversationStatus,
    pub summary_hint: Option<String>,
    pub sentiment_hint: Option<String>,
}

/// Runs the five independent post-call steps (§4.13). Each is wrapped in its
/// own failure boundary: a step failing is logged and does not prevent the
/// others from running.
pub struct PostCallProcessor {
    conversations: Arc<ConversationManager>,
    memory: Arc<MemoryManager>,
    daily_context: Arc<DailyContextStore>,
    context_cache: Arc<ContextCache>,
    analysis_llm: Arc<dyn LlmProvider>,
    analysis_model: String,
}

impl PostCallProcessor {
    pub fn new(
        conversations: Arc<ConversationManager>,
        memory: Arc<MemoryManager>,
        daily_context: Arc<DailyContextStore>,
        context_cache: Arc<ContextCache>,
        analysis_llm: Arc<dyn LlmProvider>,
        analysis_model: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            memory,
            daily_context,
            context_cache,
            analysis_llm,
            analysis_model: analysis_model.into(),
        }
    }

    #[instrument(skip(self, input), fields(conversation_id = %input.conversation_id.0))]
    pub async fn process(&self, input: PostCallInput) {
        // Step 1: persist transcript/summary.
        if let Err(e) = self.conversations.complete(
            &input.conversation_id,
            input.final_status,
            input.summary_hint.clone(),
            input.sentiment_hint.clone(),
        ) {
            error!(error = %e, "failed to persist conversation completion");
        }

        // Step 2: analyze.
        let transcript_text = render_transcript(&input.transcript);
        let analysis = analyze_call(
            self.analysis_llm.as_ref(),
            &self.analysis_model,
            input.conversation_id.clone(),
            input.tenant_id.clone(),
            &input.tenant_profile,
            &transcript_text,
        )
        .await;
        if let Err(e) = self.conversations.save_analysis(&analysis) {
            error!(error = %e, "failed to persist call analysis");
        }

        // Step 3: extract memories.
        let stored = self
            .memory
            .extract_from_conversation(&input.tenant_id.0, &input.transcript, MemorySource::Extracted)
            .await;
        info!(stored, "memory extraction complete");

        // Step 4: upsert daily call context.
        let update = CallContextUpdate {
            topics: input.topics_discussed,
            reminders_delivered: input.delivered_reminders,
            advice: input.advice_given,
        };
        if let Err(e) =
            self.daily_context.save_call_context(&input.tenant_id.0, &input.call_sid.0, input.local_date, &update)
        {
            error!(error = %e, "failed to upsert daily call context");
        }

        // Step 5: invalidate the tenant's context cache entry.
        self.context_cache.invalidate(&input.tenant_id.0);
    }
}

fn render_transcript(transcript: &[TranscriptTurn]) -> String {
    transcript
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "Caller",
                TurnRole::Assistant => "Agent",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rusqlite::Connection;
    use voicecall_llm::{ChatRequest, ChatResponse, ProviderError};

    struct FakeLlm;

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: r#"{"summary":"Talked about baking","topics":["baking"],
                    "engagement_score":7,"concerns":[],"positive_observations":[],
                    "follow_up_suggestions":[],"call_quality":"good"}"#
                    .to_string(),
                model: "fake-model".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl voicecall_llm::EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    #[tokio::test]
    async fn process_runs_all_five_steps_even_with_an_empty_transcript() {
        let conversations = Arc::new(ConversationManager::new(Connection::open_in_memory().unwrap()).unwrap());
        let conv = conversations.start(TenantId("tenant-1".to_string()), CallSid("CA1".to_string())).unwrap();

        let memory_conn = Connection::open_in_memory().unwrap();
        voicecall_memory::init_db(&memory_conn).unwrap();
        let memory = Arc::new(MemoryManager::new(memory_conn, Arc::new(FakeEmbedder), Arc::new(FakeLlm), "fake-model"));
        let daily_conn = Connection::open_in_memory().unwrap();
        voicecall_context::daily::init_db(&daily_conn).unwrap();
        let daily_context = Arc::new(DailyContextStore::new(daily_conn));
        let context_cache = Arc::new(ContextCache::new());
        context_cache.put(
            "tenant-1",
            voicecall_context::ContextCacheEntry {
                memory_context: String::new(),
                daily_context: String::new(),
                greeting_template: "hi".to_string(),
                prior_call_summaries: Vec::new(),
                news_headlines: Vec::new(),
                prefetched_at: Utc::now(),
            },
        );

        let processor = PostCallProcessor::new(
            conversations.clone(),
            memory,
            daily_context,
            context_cache.clone(),
            Arc::new(FakeLlm),
            "fake-model",
        );

        processor
            .process(PostCallInput {
                conversation_id: conv.id.clone(),
                tenant_id: TenantId("tenant-1".to_string()),
                call_sid: CallSid("CA1".to_string()),
                tenant_profile: "Dorothy, interests: baking".to_string(),
                transcript: vec![TranscriptTurn { role: TurnRole::User, content: "hi".into(), timestamp: Utc::now() }],
                topics_discussed: vec!["baking".to_string()],
                delivered_reminders: Vec::new(),
                advice_given: Vec::new(),
                local_date: Utc::now().date_naive(),
                final_status: ConversationStatus::Completed,
                summary_hint: None,
                sentiment_hint: None,
            })
            .await;

        let fetched = conversations.get(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Completed);
        assert!(conversations.get_analysis(&conv.id).unwrap().is_some());
        assert!(context_cache.get("tenant-1").is_none()); // invalidated by step 5
    }
}
