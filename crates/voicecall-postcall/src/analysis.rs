use serde::Deserialize;
use tracing::warn;

use voicecall_core::types::{CallAnalysis, Concern, ConcernType, ConversationId, Severity, TenantId};
use voicecall_llm::{ChatRequest, LlmProvider, Message, Role};

const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze a completed check-in call transcript for an \
    elderly-care service. Reply with one JSON object: \"summary\" (2-3 sentences), \
    \"topics\" (array of short strings), \"engagement_score\" (integer 1-10), \"concerns\" \
    (array of objects with \"concern_type\" one of health/cognitive/emotional/safety, \
    \"severity\" one of low/medium/high, \"description\", optional \"recommendation\"), \
    \"positive_observations\" (array of strings), \"follow_up_suggestions\" (array of \
    strings), and \"call_quality\" (a short label like \"good\"/\"degraded\"). Reply with \
    the JSON object alone.";

#[derive(Debug, Deserialize)]
struct RawConcern {
    concern_type: String,
    severity: String,
    description: String,
    recommendation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    summary: String,
    #[serde(default)]
    topics: Vec<String>,
    engagement_score: u8,
    #[serde(default)]
    concerns: Vec<RawConcern>,
    #[serde(default)]
    positive_observations: Vec<String>,
    #[serde(default)]
    follow_up_suggestions: Vec<String>,
    call_quality: String,
}

/// Call the analysis LLM and enforce the call-analysis schema (§3, §4.13
/// step 2). Any failure — provider error, malformed JSON, an
/// `engagement_score` out of `[1,10]`, or an unrecognised concern
/// type/severity — falls back to [`CallAnalysis::unavailable`] rather than
/// propagating, per the schema-violation policy (§7).
pub async fn analyze_call(
    llm: &dyn LlmProvider,
    model: &str,
    conversation_id: ConversationId,
    tenant_id: TenantId,
    tenant_profile: &str,
    transcript_text: &str,
) -> CallAnalysis {
    match run_analysis(llm, model, tenant_profile, transcript_text).await {
        Ok(Some(analysis)) => build_analysis(analysis, conversation_id, tenant_id),
        Ok(None) => {
            warn!("analysis output failed schema validation, using fallback");
            CallAnalysis::unavailable(conversation_id, tenant_id)
        }
        Err(err) => {
            warn!(error = %err, "analysis LLM call failed, using fallback");
            CallAnalysis::unavailable(conversation_id, tenant_id)
        }
    }
}

async fn run_analysis(
    llm: &dyn LlmProvider,
    model: &str,
    tenant_profile: &str,
    transcript_text: &str,
) -> Result<Option<RawAnalysis>, voicecall_llm::ProviderError> {
    let system = format!("{ANALYSIS_SYSTEM_PROMPT}\n\nTenant profile:\n{tenant_profile}");
    let mut req = ChatRequest::new(model, system, 700);
    req.messages.push(Message { role: Role::User, content: transcript_text.to_string() });

    let resp = llm.send(&req).await?;
    let raw: RawAnalysis = match serde_json::from_str(resp.content.trim()) {
        Ok(r) => r,
        Err(_) => return Ok(None),
    };
    if !(1..=10).contains(&raw.engagement_score) {
        return Ok(None);
    }
    Ok(Some(raw))
}

fn build_analysis(raw: RawAnalysis, conversation_id: ConversationId, tenant_id: TenantId) -> CallAnalysis {
    let concerns = raw
        .concerns
        .into_iter()
        .filter_map(|c| {
            Some(Concern {
                concern_type: parse_concern_type(&c.concern_type)?,
                severity: parse_severity(&c.severity)?,
                description: c.description,
                recommendation: c.recommendation,
            })
        })
        .collect();

    CallAnalysis {
        conversation_id,
        tenant_id,
        summary: raw.summary,
        topics: raw.topics,
        engagement_score: raw.engagement_score,
        concerns,
        positive_observations: raw.positive_observations,
        follow_up_suggestions: raw.follow_up_suggestions,
        call_quality: raw.call_quality,
    }
}

fn parse_concern_type(s: &str) -> Option<ConcernType> {
    match s {
        "health" => Some(ConcernType::Health),
        "cognitive" => Some(ConcernType::Cognitive),
        "emotional" => Some(ConcernType::Emotional),
        "safety" => Some(ConcernType::Safety),
        _ => None,
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s {
        "low" => Some(Severity::Low),
        "medium" => Some(Severity::Medium),
        "high" => Some(Severity::High),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voicecall_llm::{ChatResponse, ProviderError};

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
                model: "fake-model".to_string(),
                tokens_in: 10,
                tokens_out: 10,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn ids() -> (ConversationId, TenantId) {
        (ConversationId("conv-1".to_string()), TenantId("tenant-1".to_string()))
    }

    #[tokio::test]
    async fn well_formed_output_is_parsed() {
        let llm = FakeLlm {
            response: r#"{"summary":"Nice chat","topics":["baking"],"engagement_score":8,
                "concerns":[{"concern_type":"health","severity":"low","description":"mild cough"}],
                "positive_observations":["sounded cheerful"],"follow_up_suggestions":[],
                "call_quality":"good"}"#
                .to_string(),
        };
        let (conv, tenant) = ids();
        let analysis = analyze_call(&llm, "model", conv, tenant, "profile", "transcript").await;
        assert_eq!(analysis.summary, "Nice chat");
        assert_eq!(analysis.engagement_score, 8);
        assert_eq!(analysis.concerns.len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_unavailable() {
        let llm = FakeLlm { response: "not json".to_string() };
        let (conv, tenant) = ids();
        let analysis = analyze_call(&llm, "model", conv, tenant, "profile", "transcript").await;
        assert_eq!(analysis.summary, "Analysis unavailable");
        assert_eq!(analysis.engagement_score, 5);
    }

    #[tokio::test]
    async fn out_of_range_engagement_score_falls_back() {
        let llm = FakeLlm {
            response: r#"{"summary":"x","topics":[],"engagement_score":15,
                "concerns":[],"positive_observations":[],"follow_up_suggestions":[],
                "call_quality":"good"}"#
                .to_string(),
        };
        let (conv, tenant) = ids();
        let analysis = analyze_call(&llm, "model", conv, tenant, "profile", "transcript").await;
        assert_eq!(analysis.summary, "Analysis unavailable");
    }
}
