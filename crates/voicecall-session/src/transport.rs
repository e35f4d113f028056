use async_trait::async_trait;

/// Seam to the telephony media-stream connection (owned by the gateway
/// crate). The session never touches the WebSocket directly — it only
/// pushes outbound audio/control frames and reads decoded inbound audio
/// (§4.9, §6 Telephony media stream).
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Queue 8kHz mono µ-law audio for playback, tagged with a mark name so
    /// its eventual playback can be observed via `on_mark`.
    async fn send_audio(&self, mulaw_bytes: Vec<u8>, mark_name: &str);

    /// Flush any audio still queued on the provider's side — how barge-in
    /// interrupts in-flight TTS playback (§4.9 step 3, §6).
    async fn clear(&self);

    /// Next chunk of raw inbound µ-law audio, or `None` once the transport
    /// has closed.
    async fn recv_audio(&self) -> Option<Vec<u8>>;
}
