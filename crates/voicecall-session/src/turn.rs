use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use voicecall_llm::prompt::SystemPrompt;
use voicecall_llm::{ChatRequest, LlmProvider, ProviderError, StreamEvent, ToolDefinition};
use voicecall_tools::ToolRegistry;
use voicecall_tracker::GuidanceStripper;

/// Mid-turn tool round-trips rarely exceed one or two; this only guards
/// against a model stuck calling tools forever (the teacher's whole-session
/// loop allows 25 — this is one LLM turn, not a whole call).
const MAX_TOOL_ITERATIONS: usize = 6;

/// Everything `run_turn` needs beyond the conversation history it's handed.
pub struct TurnRequest {
    pub model: String,
    pub system_prompt: SystemPrompt,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

/// What one user turn produced, once the LLM stopped asking for tools.
pub struct TurnOutput {
    /// Concatenated, guidance-stripped text that was forwarded to TTS —
    /// exactly what `ConversationTracker::observe_assistant` should see.
    pub spoken_text: String,
    /// Raw JSON message history including this turn's assistant/tool_result
    /// blocks, to carry into the next call's `raw_messages`.
    pub raw_messages: Vec<serde_json::Value>,
    pub tool_calls_made: Vec<String>,
    pub stop_reason: String,
}

/// Run one user turn to completion: stream the voice LLM's reply, forward
/// text through the guidance stripper into `tts_tx` as it arrives, and
/// transparently dispatch any tool calls mid-stream before continuing
/// (§4.9 step 2). Cancellable for barge-in (§4.9 step 3, §5).
#[instrument(skip(llm, registry, req, raw_messages, tts_tx, cancel))]
pub async fn run_turn(
    llm: &dyn LlmProvider,
    registry: &ToolRegistry,
    req: &TurnRequest,
    mut raw_messages: Vec<serde_json::Value>,
    tts_tx: mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> Result<TurnOutput, ProviderError> {
    let mut spoken_text = String::new();
    let mut tool_calls_made = Vec::new();
    let mut final_stop_reason = String::new();

    for iteration in 0..MAX_TOOL_ITERATIONS {
        debug!(iteration, "turn loop iteration");

        let mut call = ChatRequest::new(req.model.clone(), "", req.max_tokens);
        call.system_prompt = Some(req.system_prompt.clone());
        call.stream = true;
        call.tools = req.tools.clone();
        call.raw_messages = Some(raw_messages.clone());

        let (tx, mut rx) = mpsc::channel(32);
        // `send_stream`'s future pushes events as it goes and only resolves
        // once the whole response (or error) has landed, so it runs alongside
        // event consumption rather than on a separate task.
        let mut stream_task = llm.send_stream(&call, tx);

        let mut stripper = GuidanceStripper::new();
        let mut turn_text = String::new();
        let mut pending_tool_calls: Vec<voicecall_llm::ToolCall> = Vec::new();
        let mut stream_error: Option<String> = None;
        let mut done_meta: Option<(String, String)> = None; // (stop_reason, _model)

        let mut send_stream_done = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ProviderError::Cancelled);
                }
                result = &mut stream_task, if !send_stream_done => {
                    send_stream_done = true;
                    if let Err(e) = result {
                        stream_error = Some(e.to_string());
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(StreamEvent::TextDelta { text }) => {
                            turn_text.push_str(&text);
                            let speakable = stripper.push(&text);
                            if !speakable.is_empty() {
                                let _ = tts_tx.send(speakable).await;
                            }
                        }
                        Some(StreamEvent::ToolUse { id, name, input }) => {
                            pending_tool_calls.push(voicecall_llm::ToolCall { id, name, input });
                        }
                        Some(StreamEvent::Done { model, stop_reason, .. }) => {
                            done_meta = Some((stop_reason, model));
                        }
                        Some(StreamEvent::Error { message }) => {
                            stream_error = Some(message);
                        }
                        None if send_stream_done => break,
                        None => continue,
                    }
                }
            }
        }

        let trailing = stripper.flush();
        if !trailing.is_empty() {
            let _ = tts_tx.send(trailing).await;
        }

        if let Some(message) = stream_error {
            return Err(ProviderError::Unavailable(message));
        }

        spoken_text.push_str(&turn_text);
        let (stop_reason, _model) = done_meta.unwrap_or_else(|| ("end_turn".to_string(), String::new()));
        final_stop_reason = stop_reason.clone();

        if pending_tool_calls.is_empty() || stop_reason != "tool_use" {
            break;
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !turn_text.is_empty() {
            assistant_content.push(serde_json::json!({ "type": "text", "text": turn_text }));
        }
        for call in &pending_tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

        let mut tool_result_content = Vec::new();
        for call in &pending_tool_calls {
            let result = match registry.get(&call.name) {
                Some(tool) => tool.execute(call.input.clone()).await,
                None => voicecall_tools::ToolResult::error(format!("unknown tool: {}", call.name)),
            };
            tool_calls_made.push(call.name.clone());
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));

        if iteration == MAX_TOOL_ITERATIONS - 1 {
            warn!(max_iterations = MAX_TOOL_ITERATIONS, "turn hit tool iteration cap");
        }
    }

    Ok(TurnOutput {
        spoken_text,
        raw_messages,
        tool_calls_made,
        stop_reason: final_stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use voicecall_llm::ChatResponse;
    use voicecall_tools::{NewsCache, ToolContext, ToolRegistry};

    use super::*;

    struct NoopToolContext;

    #[async_trait]
    impl ToolContext for NoopToolContext {
        async fn search_memories(&self, _query: &str) -> Result<Vec<String>, String> {
            Ok(vec![])
        }
        async fn get_news(&self, _topic: &str) -> Result<Vec<String>, String> {
            Ok(vec![])
        }
        async fn save_important_detail(
            &self,
            _detail: &str,
            _category: voicecall_core::types::MemoryCategory,
        ) -> Result<(), String> {
            Ok(())
        }
        async fn mark_reminder_acknowledged(
            &self,
            _reminder_id: &str,
            _status: voicecall_core::types::DeliveryStatus,
            _user_response: Option<String>,
        ) -> Result<bool, String> {
            Ok(true)
        }
        fn request_transition(&self, _target: voicecall_flow::Phase) -> bool {
            true
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(NoopToolContext), Arc::new(NewsCache::new()))
    }

    fn base_request() -> TurnRequest {
        TurnRequest {
            model: "fake-model".to_string(),
            system_prompt: SystemPrompt {
                static_tier: "persona".to_string(),
                tenant_tier: String::new(),
                volatile_tier: String::new(),
            },
            max_tokens: 120,
            tools: Vec::new(),
        }
    }

    /// Always responds with a fixed text, never asks for a tool.
    struct PlainTextLlm;

    #[async_trait]
    impl LlmProvider for PlainTextLlm {
        fn name(&self) -> &str {
            "plain"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("run_turn always streams")
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            let _ = tx
                .send(StreamEvent::TextDelta { text: "hello there".to_string() })
                .await;
            let _ = tx
                .send(StreamEvent::Done {
                    model: "plain".to_string(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "end_turn".to_string(),
                })
                .await;
            Ok(())
        }
    }

    /// Calls a tool exactly once, then answers in plain text on the second
    /// round-trip — exercises the tool-dispatch loop.
    struct OneToolCallLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for OneToolCallLlm {
        fn name(&self) -> &str {
            "one-tool"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("run_turn always streams")
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            if call_index == 0 {
                let _ = tx
                    .send(StreamEvent::ToolUse {
                        id: "call-1".to_string(),
                        name: "search_memories".to_string(),
                        input: json!({ "query": "garden" }),
                    })
                    .await;
                let _ = tx
                    .send(StreamEvent::Done {
                        model: "one-tool".to_string(),
                        tokens_in: 10,
                        tokens_out: 5,
                        stop_reason: "tool_use".to_string(),
                    })
                    .await;
            } else {
                let _ = tx
                    .send(StreamEvent::TextDelta { text: "found it".to_string() })
                    .await;
                let _ = tx
                    .send(StreamEvent::Done {
                        model: "one-tool".to_string(),
                        tokens_in: 10,
                        tokens_out: 5,
                        stop_reason: "end_turn".to_string(),
                    })
                    .await;
            }
            Ok(())
        }
    }

    /// Never stops asking for tools — exercises the iteration cap.
    struct AlwaysToolLlm;

    #[async_trait]
    impl LlmProvider for AlwaysToolLlm {
        fn name(&self) -> &str {
            "always-tool"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("run_turn always streams")
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            let _ = tx
                .send(StreamEvent::ToolUse {
                    id: "call-x".to_string(),
                    name: "search_memories".to_string(),
                    input: json!({ "query": "anything" }),
                })
                .await;
            let _ = tx
                .send(StreamEvent::Done {
                    model: "always-tool".to_string(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "tool_use".to_string(),
                })
                .await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn plain_reply_forwards_text_and_stops_after_one_round() {
        let llm = PlainTextLlm;
        let reg = registry();
        let req = base_request();
        let (tts_tx, mut tts_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let out = run_turn(&llm, &reg, &req, Vec::new(), tts_tx, &cancel).await.unwrap();

        assert_eq!(out.spoken_text, "hello there");
        assert!(out.tool_calls_made.is_empty());
        assert_eq!(out.stop_reason, "end_turn");
        drop(out);
        let forwarded = tts_rx.recv().await.unwrap();
        assert_eq!(forwarded, "hello there");
    }

    #[tokio::test]
    async fn tool_call_round_trips_then_finishes_with_text() {
        let llm = OneToolCallLlm { calls: AtomicUsize::new(0) };
        let reg = registry();
        let req = base_request();
        let (tts_tx, _tts_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let out = run_turn(&llm, &reg, &req, Vec::new(), tts_tx, &cancel).await.unwrap();

        assert_eq!(out.tool_calls_made, vec!["search_memories".to_string()]);
        assert_eq!(out.spoken_text, "found it");
        assert_eq!(out.stop_reason, "end_turn");
        // assistant + tool_result messages from the round-trip were appended.
        assert_eq!(out.raw_messages.len(), 2);
    }

    #[tokio::test]
    async fn hitting_the_iteration_cap_stops_without_erroring() {
        let llm = AlwaysToolLlm;
        let reg = registry();
        let req = base_request();
        let (tts_tx, _tts_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let out = run_turn(&llm, &reg, &req, Vec::new(), tts_tx, &cancel).await.unwrap();

        assert_eq!(out.tool_calls_made.len(), MAX_TOOL_ITERATIONS);
        assert_eq!(out.stop_reason, "tool_use");
    }

    #[tokio::test]
    async fn cancellation_returns_cancelled_error() {
        let llm = PlainTextLlmNeverResponds;
        let reg = registry();
        let req = base_request();
        let (tts_tx, _tts_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_turn(&llm, &reg, &req, Vec::new(), tts_tx, &cancel).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    /// Never sends anything and never resolves — only reachable when the
    /// already-cancelled token wins the race immediately.
    struct PlainTextLlmNeverResponds;

    #[async_trait]
    impl LlmProvider for PlainTextLlmNeverResponds {
        fn name(&self) -> &str {
            "never"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unreachable!("run_turn always streams")
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            _tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }
}
