use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProtocolError;

/// Voice tuning parameters sent at the start of a TTS streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub speed: f32,
}

impl From<&voicecall_core::config::TtsTuning> for VoiceConfig {
    fn from(tuning: &voicecall_core::config::TtsTuning) -> Self {
        Self {
            voice_id: tuning.voice_id.clone(),
            stability: tuning.tts_stability,
            similarity_boost: tuning.tts_similarity_boost,
            style: tuning.tts_style,
            use_speaker_boost: true,
            speed: tuning.tts_speed,
        }
    }
}

/// One text chunk sent to the TTS provider mid-stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsTextChunk {
    pub text: String,
    /// Flush hint: true for the final chunk of a turn so the provider emits
    /// any buffered audio immediately instead of waiting for more text.
    pub flush: bool,
}

/// Text-to-speech session. `synthesize_stream` is the sentence-fragment
/// streaming path; `synthesize` is the buffered legacy path used when
/// `streaming_enabled=false` (Decision D1) — both produce 8kHz mono µ-law
/// frames on `audio_tx` so the session orchestrator's transport stage never
/// needs to know which path produced them.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize_stream(
        &self,
        voice: &VoiceConfig,
        text_rx: mpsc::Receiver<TtsTextChunk>,
        audio_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), ProtocolError>;

    async fn synthesize(&self, voice: &VoiceConfig, text: &str) -> Result<Vec<u8>, ProtocolError>;
}

/// HTTP client hitting the provider's streaming synthesis endpoint once per
/// flushed text chunk. A true low-latency integration would hold one
/// websocket open for the whole turn; this approximates it with one request
/// per chunk, which is the provider's documented fallback for HTTP-only
/// clients.
pub struct HttpTtsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpTtsProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.elevenlabs.io".to_string()),
        }
    }

    async fn request_audio(&self, voice: &VoiceConfig, text: &str) -> Result<Vec<u8>, ProtocolError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format=ulaw_8000",
            self.base_url, voice.voice_id
        );
        let body = serde_json::json!({
            "text": text,
            "voice_settings": {
                "stability": voice.stability,
                "similarity_boost": voice.similarity_boost,
                "style": voice.style,
                "use_speaker_boost": voice.use_speaker_boost,
                "speed": voice.speed,
            }
        });
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize_stream(
        &self,
        voice: &VoiceConfig,
        mut text_rx: mpsc::Receiver<TtsTextChunk>,
        audio_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), ProtocolError> {
        while let Some(chunk) = text_rx.recv().await {
            if chunk.text.trim().is_empty() {
                continue;
            }
            let audio = self.request_audio(voice, &chunk.text).await?;
            if audio_tx.send(audio).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn synthesize(&self, voice: &VoiceConfig, text: &str) -> Result<Vec<u8>, ProtocolError> {
        self.request_audio(voice, text).await
    }
}
