//! Media-stream WebSocket handler — the telephony provider connects here
//! once `/voice/answer` points it at this socket (§6 Telephony media
//! stream). One connection == one call == one [`voicecall_session::Session`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use voicecall_core::config::{HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES};
use voicecall_core::types::CallSid;
use voicecall_protocol::frames::{decode_media_payload, StreamEventFrame};
use voicecall_session::{Session, StartupLookup};

use crate::app::AppState;
use crate::transport::WsAudioTransport;

pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut source) = socket.split();

    // Wait for the `start` event; everything about this call (SID, custom
    // parameters) is keyed off it.
    let deadline = tokio::time::sleep(Duration::from_millis(HANDSHAKE_TIMEOUT_MS));
    tokio::pin!(deadline);

    let start = loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("media stream handshake timed out waiting for start event");
                return;
            }
            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!("start handshake payload too large, dropping connection");
                            return;
                        }
                        match serde_json::from_str::<StreamEventFrame>(&text) {
                            Ok(StreamEventFrame::Start { start }) => break start,
                            Ok(_) => continue, // ignore anything before start
                            Err(e) => {
                                warn!(error = %e, "malformed frame before start event");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    _ => continue,
                }
            }
        }
    };

    let call_sid = CallSid(start.call_sid.clone());
    info!(call_sid = %call_sid.as_str(), stream_sid = %start.stream_sid, "media stream started");

    let lookup = if start.custom_parameters.call_type == "reminder" {
        match state
            .scheduler_pending
            .as_ref()
            .and_then(|pending| pending.get(&start.call_sid).map(|e| e.value().clone()))
        {
            Some(ctx) => StartupLookup::ReminderInitiated(ctx),
            None => StartupLookup::ManualOutbound {
                tenant_id: start.custom_parameters.senior_id.clone(),
            },
        }
    } else {
        StartupLookup::ManualOutbound {
            tenant_id: start.custom_parameters.senior_id.clone(),
        }
    };

    // Outbound: session -> writer task -> WS sink.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<StreamEventFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound: WS source -> decoded µ-law chunks -> transport.recv_audio().
    let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(64);
    let reader_sid = start.stream_sid.clone();
    let reader_call_sid = call_sid.clone();
    let reader_state = state.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if text.len() > MAX_PAYLOAD_BYTES {
                        warn!(stream_sid = %reader_sid, "inbound payload too large, dropping connection");
                        break;
                    }
                    match serde_json::from_str::<StreamEventFrame>(&text) {
                        Ok(StreamEventFrame::Media { media }) => {
                            match decode_media_payload(&media) {
                                Ok(bytes) => {
                                    if inbound_tx.send(bytes).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!(error = %e, "failed to decode media payload"),
                            }
                        }
                        Ok(StreamEventFrame::Stop { .. }) => break,
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "malformed media-stream frame"),
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
        reader_state.active_calls.remove(&reader_call_sid.0);
    });

    let transport = Arc::new(WsAudioTransport::new(
        start.stream_sid.clone(),
        outbound_tx,
        inbound_rx,
    ));
    state.active_calls.insert(call_sid.0.clone(), ());

    let session = Session::new(state.session_deps.clone(), transport);
    if let Err(e) = session.run(call_sid.clone(), lookup).await {
        warn!(call_sid = %call_sid.as_str(), error = %e, "session ended with an error");
    }

    state.active_calls.remove(&call_sid.0);
    reader.abort();
    writer.abort();
    info!(call_sid = %call_sid.as_str(), "media stream closed");
}
