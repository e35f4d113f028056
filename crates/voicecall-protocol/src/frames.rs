use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Custom parameters the telephony provider echoes back on the `start` event,
/// set by us in the `/voice/answer` instruction document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamCustomParameters {
    pub senior_id: String,
    pub conversation_id: String,
    pub call_type: String,
}

/// `start` event body — the first event on a media-stream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStart {
    pub call_sid: String,
    pub stream_sid: String,
    #[serde(default)]
    pub custom_parameters: StreamCustomParameters,
}

/// `media` event body — one chunk of base64-encoded µ-law 8 kHz mono audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMedia {
    pub stream_sid: String,
    /// Monotonically increasing per-stream sequence number as a string, per wire convention.
    pub sequence_number: String,
    pub payload: String,
    pub track: MediaTrack,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaTrack {
    Inbound,
    Outbound,
}

/// `mark` event — sent by us after queuing a named chunk of outbound audio,
/// echoed back by the provider once that audio has actually played. Used to
/// know when barge-in interruption has fully taken effect downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMark {
    pub stream_sid: String,
    pub name: String,
}

/// `clear` event — sent by us to flush any outbound audio still queued on the
/// provider's side. This is how barge-in interrupts in-flight TTS playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamClear {
    pub stream_sid: String,
}

/// `stop` event — the provider is tearing down the stream (hangup or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStop {
    pub call_sid: String,
    pub stream_sid: String,
}

/// Tagged union of all inbound/outbound media-stream events on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEventFrame {
    Start { start: StreamStart },
    Media { media: StreamMedia },
    Mark { mark: StreamMark },
    Clear { clear: StreamClear },
    Stop { stop: StreamStop },
}

impl StreamEventFrame {
    pub fn media(stream_sid: impl Into<String>, sequence_number: u64, payload_bytes: &[u8]) -> Self {
        StreamEventFrame::Media {
            media: StreamMedia {
                stream_sid: stream_sid.into(),
                sequence_number: sequence_number.to_string(),
                payload: base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    payload_bytes,
                ),
                track: MediaTrack::Outbound,
            },
        }
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        StreamEventFrame::Mark {
            mark: StreamMark {
                stream_sid: stream_sid.into(),
                name: name.into(),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        StreamEventFrame::Clear {
            clear: StreamClear {
                stream_sid: stream_sid.into(),
            },
        }
    }
}

/// Decode the base64 payload of an inbound `media` frame into raw µ-law bytes.
pub fn decode_media_payload(media: &StreamMedia) -> Result<Vec<u8>, base64::DecodeError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &media.payload)
}

/// Form parameters posted to the `/voice/status` webhook by the telephony provider.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusCallback {
    pub call_sid: String,
    pub call_status: CallStatus,
    #[serde(default)]
    pub call_duration: Option<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
}

impl CallStatus {
    /// `/voice/status` callbacks at this status or later end the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Failed
        )
    }
}
