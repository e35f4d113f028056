use async_trait::async_trait;

use voicecall_llm::{ChatRequest, LlmProvider, Message, ProviderError, Role};

const NEWS_SYSTEM_PROMPT: &str = "You help a voice assistant make small talk with an elderly \
    caller. Given a topic, reply with a JSON array of at most 2 short, current, plausible \
    headlines or facts about it (one sentence each, no dates you can't verify, nothing alarming \
    or political). Reply with the JSON array alone.";

/// Seam for the `get_news` tool (§4.6). No fixture news API appears anywhere
/// in this workspace's dependency stack, so the default implementation asks
/// the voice LLM itself for a couple of topical lines rather than fabricating
/// a third-party news SDK dependency.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn headlines(&self, topic: &str) -> Result<Vec<String>, ProviderError>;
}

pub struct LlmNewsProvider {
    llm: std::sync::Arc<dyn LlmProvider>,
    model: String,
}

impl LlmNewsProvider {
    pub fn new(llm: std::sync::Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }
}

#[async_trait]
impl NewsProvider for LlmNewsProvider {
    async fn headlines(&self, topic: &str) -> Result<Vec<String>, ProviderError> {
        let mut req = ChatRequest::new(self.model.clone(), NEWS_SYSTEM_PROMPT, 200);
        req.messages = vec![Message {
            role: Role::User,
            content: topic.to_string(),
        }];

        let resp = self.llm.send(&req).await?;
        let items: Vec<String> = serde_json::from_str(resp.content.trim())
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicecall_llm::ChatResponse;

    struct FakeLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.response.clone(),
                model: "fake".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn parses_a_json_array_of_headlines() {
        let provider = LlmNewsProvider::new(
            std::sync::Arc::new(FakeLlm {
                response: r#"["Local farmers market opens this weekend."]"#.to_string(),
            }),
            "fake-model",
        );
        let items = provider.headlines("local weather").await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn malformed_output_is_a_provider_error() {
        let provider = LlmNewsProvider::new(
            std::sync::Arc::new(FakeLlm { response: "not json".to_string() }),
            "fake-model",
        );
        assert!(provider.headlines("anything").await.is_err());
    }
}
