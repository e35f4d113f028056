//! `AudioTransport` over the telephony provider's bidirectional media-stream
//! WebSocket (§6 Telephony media stream). The connection task owns the
//! actual `WebSocket` split halves; this struct is the shared handle the
//! session pushes/pulls audio through.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::warn;

use voicecall_protocol::frames::StreamEventFrame;
use voicecall_session::AudioTransport;

pub struct WsAudioTransport {
    stream_sid: String,
    outbound: mpsc::UnboundedSender<StreamEventFrame>,
    inbound: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
    sequence: std::sync::atomic::AtomicU64,
}

impl WsAudioTransport {
    pub fn new(
        stream_sid: String,
        outbound: mpsc::UnboundedSender<StreamEventFrame>,
        inbound: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            stream_sid,
            outbound,
            inbound: AsyncMutex::new(inbound),
            sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AudioTransport for WsAudioTransport {
    async fn send_audio(&self, mulaw_bytes: Vec<u8>, mark_name: &str) {
        let seq = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let media = StreamEventFrame::media(self.stream_sid.clone(), seq, &mulaw_bytes);
        if self.outbound.send(media).is_err() {
            warn!(stream_sid = %self.stream_sid, "outbound media dropped, socket writer gone");
            return;
        }
        let mark = StreamEventFrame::mark(self.stream_sid.clone(), mark_name.to_string());
        let _ = self.outbound.send(mark);
    }

    async fn clear(&self) {
        let _ = self
            .outbound
            .send(StreamEventFrame::clear(self.stream_sid.clone()));
    }

    async fn recv_audio(&self) -> Option<Vec<u8>> {
        self.inbound.lock().await.recv().await
    }
}
