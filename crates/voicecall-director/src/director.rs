use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{instrument, warn};

use voicecall_flow::ending::{HARD_CAP_END, HARD_CAP_WIND_DOWN};
use voicecall_llm::{ChatRequest, LlmProvider, Message, ProviderError, Role};

use crate::handle::{channel, DirectorHandle};
use crate::types::{parse_recommendation, sanitize_guidance, DirectorGuidance, RawDirectorOutput};

pub const TIMEOUT: Duration = Duration::from_millis(400);

const DIRECTOR_SYSTEM_PROMPT: &str = "You are a silent call director watching a check-in call \
    between a voice assistant and an elderly person. After each user turn, reply with exactly \
    one JSON object and nothing else: {\"guidance\": string, \"recommendation\": \
    \"stay\"|\"advance\"|\"wind_down\"|\"close\", \"token_advice\": number or null, \
    \"force_wind_down\": bool, \"force_end\": bool}. Keep guidance under 500 characters.";

/// Non-blocking per-turn analyzer (§4.3). Every call is spawned and raced
/// against a 400ms budget; the result lands in a single-slot channel that
/// the turn loop reads without ever waiting on it.
pub struct Director {
    provider: Arc<dyn LlmProvider>,
    model: String,
    tx: watch::Sender<DirectorGuidance>,
}

impl Director {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> (Self, DirectorHandle) {
        let (tx, handle) = channel();
        (
            Self {
                provider,
                model: model.into(),
                tx,
            },
            handle,
        )
    }

    /// Fire-and-forget: spawn a task analyzing this turn. If a prior call is
    /// still in flight its result still lands whenever it finishes, but the
    /// orchestrator never awaits this call directly.
    #[instrument(skip(self, history))]
    pub fn spawn_turn(&self, utterance: String, history: Vec<(Role, String)>) {
        let provider = self.provider.clone();
        let model = self.model.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let outcome = tokio::time::timeout(
                TIMEOUT,
                run_director_call(provider, &model, &utterance, &history),
            )
            .await;

            match outcome {
                Ok(Ok(guidance)) => {
                    let _ = tx.send(guidance);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "director call failed, dropping contribution");
                }
                Err(_) => {
                    warn!("director call exceeded 400ms budget, dropping contribution");
                }
            }
        });
    }
}

async fn run_director_call(
    provider: Arc<dyn LlmProvider>,
    model: &str,
    utterance: &str,
    history: &[(Role, String)],
) -> Result<DirectorGuidance, ProviderError> {
    let mut messages: Vec<Message> = history
        .iter()
        .map(|(role, content)| Message {
            role: role.clone(),
            content: content.clone(),
        })
        .collect();
    messages.push(Message {
        role: Role::User,
        content: utterance.to_string(),
    });

    let mut req = ChatRequest::new(model, DIRECTOR_SYSTEM_PROMPT, 200);
    req.messages = messages;

    let resp = provider.send(&req).await?;
    let raw: RawDirectorOutput =
        serde_json::from_str(resp.content.trim()).map_err(|e| ProviderError::Parse(e.to_string()))?;

    Ok(DirectorGuidance {
        guidance: sanitize_guidance(&raw.guidance),
        recommendation: parse_recommendation(raw.recommendation.as_deref()),
        token_advice: raw.token_advice,
        force_wind_down: raw.force_wind_down,
        force_end: raw.force_end,
    })
}

/// Fallback force-actions independent of Director availability (§4.3):
/// wind down at 9 minutes, end at 12 minutes since call start.
pub fn force_actions_for_elapsed(elapsed: Duration) -> (bool, bool) {
    let force_wind_down = elapsed >= HARD_CAP_WIND_DOWN;
    let force_end = elapsed >= HARD_CAP_END;
    (force_wind_down, force_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_force_actions_before_nine_minutes() {
        let (wind_down, end) = force_actions_for_elapsed(Duration::from_secs(8 * 60));
        assert!(!wind_down);
        assert!(!end);
    }

    #[test]
    fn force_wind_down_at_nine_minutes() {
        let (wind_down, end) = force_actions_for_elapsed(Duration::from_secs(9 * 60));
        assert!(wind_down);
        assert!(!end);
    }

    #[test]
    fn force_end_at_twelve_minutes() {
        let (wind_down, end) = force_actions_for_elapsed(Duration::from_secs(12 * 60));
        assert!(wind_down);
        assert!(end);
    }
}
