use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream::StreamEvent;
use crate::types::{ChatRequest, ChatResponse};

/// Common interface for the three LLM roles (voice, director, analysis).
/// A single concrete implementation (`AnthropicProvider`) backs all three;
/// the role only changes which API key and model are configured.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send a non-streaming chat request, wait for the full response. Used
    /// by the Director (low-latency JSON) and the analysis/extraction LLM.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel. Used by the voice LLM.
    /// Default falls back to non-streaming send, emitting TextDelta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

/// Embedding provider: single text input -> 1536-dim float vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Transient errors are retried with backoff by callers (§7); all other
    /// kinds degrade immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_) | ProviderError::RateLimited { .. } | ProviderError::Unavailable(_)
        )
    }
}
