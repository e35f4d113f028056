use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ProtocolError;

/// Event emitted by the streaming STT provider. The core only dispatches
/// turns on `Final`, but watches `Interim` for barge-in detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SttEvent {
    Interim { text: String },
    Final { text: String },
    UtteranceEnd,
    Error { message: String },
}

/// Streaming speech-to-text session: audio chunks in, transcription events
/// out. One instance is opened per call and lives for the call's duration.
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// Run the duplex session until `audio_rx` closes or the provider
    /// connection fails. Caller feeds raw PCM16 16kHz chunks; events land on
    /// `event_tx` in arrival order.
    async fn run(
        &self,
        audio_rx: mpsc::Receiver<Vec<i16>>,
        event_tx: mpsc::Sender<SttEvent>,
    ) -> Result<(), ProtocolError>;
}

#[derive(Debug, Deserialize)]
struct RawSttResult {
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
    channel: RawChannel,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    alternatives: Vec<RawAlternative>,
}

#[derive(Debug, Deserialize)]
struct RawAlternative {
    transcript: String,
}

/// HTTP chunked-upload STT client. Uploads the call's raw audio as a
/// streamed request body and reads newline-delimited JSON transcription
/// results back off the response body as they arrive — the provider's
/// streaming-over-HTTP mode, distinct from its websocket API.
pub struct HttpSttProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpSttProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.deepgram.com".to_string()),
        }
    }
}

#[async_trait]
impl SttProvider for HttpSttProvider {
    async fn run(
        &self,
        mut audio_rx: mpsc::Receiver<Vec<i16>>,
        event_tx: mpsc::Sender<SttEvent>,
    ) -> Result<(), ProtocolError> {
        let url = format!(
            "{}/v1/listen?encoding=linear16&sample_rate=16000&channels=1&interim_results=true&endpointing=true",
            self.base_url
        );

        let (body_tx, body_rx) = mpsc::channel::<Result<Vec<u8>, std::io::Error>>(32);
        let stream = tokio_stream::wrappers::ReceiverStream::new(body_rx);
        let body = reqwest::Body::wrap_stream(stream);

        let upload = tokio::spawn(async move {
            while let Some(samples) = audio_rx.recv().await {
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for s in samples {
                    bytes.extend_from_slice(&s.to_le_bytes());
                }
                if body_tx.send(Ok(bytes)).await.is_err() {
                    break;
                }
            }
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("content-type", "audio/l16")
            .body(body)
            .send()
            .await?;

        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        loop {
            use futures_util::StreamExt;
            let chunk = match stream.next().await {
                Some(Ok(c)) => c,
                Some(Err(e)) => return Err(ProtocolError::Http(e)),
                None => break,
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if let Some(event) = parse_result_line(&line) {
                    if event_tx.send(event).await.is_err() {
                        upload.abort();
                        return Ok(());
                    }
                } else {
                    debug!(line, "unrecognized STT result line, skipping");
                }
            }
        }

        upload.abort();
        Ok(())
    }
}

fn parse_result_line(line: &str) -> Option<SttEvent> {
    let raw: RawSttResult = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "failed to parse STT result line");
            return None;
        }
    };
    let transcript = raw.channel.alternatives.into_iter().next()?.transcript;
    if transcript.trim().is_empty() {
        return None;
    }
    if raw.is_final || raw.speech_final {
        Some(SttEvent::Final { text: transcript })
    } else {
        Some(SttEvent::Interim { text: transcript })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_result_line_parses_to_final_event() {
        let line = r#"{"is_final":true,"channel":{"alternatives":[{"transcript":"I took my pills"}]}}"#;
        let event = parse_result_line(line).unwrap();
        if let SttEvent::Final { text } = event {
            assert_eq!(text, "I took my pills");
        } else {
            panic!("expected Final");
        }
    }

    #[test]
    fn interim_result_line_parses_to_interim_event() {
        let line = r#"{"is_final":false,"channel":{"alternatives":[{"transcript":"I took"}]}}"#;
        let event = parse_result_line(line).unwrap();
        assert!(matches!(event, SttEvent::Interim { .. }));
    }

    #[test]
    fn empty_transcript_is_skipped() {
        let line = r#"{"is_final":true,"channel":{"alternatives":[{"transcript":""}]}}"#;
        assert!(parse_result_line(line).is_none());
    }
}
