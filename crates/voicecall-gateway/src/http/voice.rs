//! The two telephony webhooks (§6 Telephony): `/voice/answer` points the
//! provider at our media-stream socket, `/voice/status` reports call
//! lifecycle events after the fact. Both are HMAC-signed over the request
//! URL and sorted form parameters.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use voicecall_protocol::answer::ConnectInstruction;
use voicecall_protocol::frames::{StatusCallback, StreamCustomParameters};
use voicecall_protocol::signature::verify_signature;

use crate::app::AppState;

const SIGNATURE_HEADER: &str = "x-voicecall-signature";

fn verify(state: &AppState, url: &str, body: &Bytes, headers: &HeaderMap) -> Result<BTreeMap<String, String>, (StatusCode, Json<Value>)> {
    let params: BTreeMap<String, String> = serde_urlencoded::from_bytes(body)
        .map_err(|_| bad_request("malformed form body"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing signature header"))?;

    verify_signature(&state.config.telephony.auth_token, url, &params, signature)
        .map_err(|e| unauthorized(&e.to_string()))?;

    Ok(params)
}

/// POST /voice/answer
pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ConnectInstruction>, (StatusCode, Json<Value>)> {
    let url = format!("{}/voice/answer", state.config.public_base_url);
    let params = verify(&state, &url, &body, &headers)?;

    let call_sid = params.get("CallSid").cloned().unwrap_or_default();
    let from = params.get("From").cloned().unwrap_or_default();

    let (senior_id, call_type) = if let Some(pending) = state
        .scheduler_pending
        .as_ref()
        .and_then(|p| p.get(&call_sid).map(|e| e.value().tenant_id.0.clone()))
    {
        (pending, "reminder".to_string())
    } else if let Some(tenant) = state.tenants.get_by_phone(&from).ok().flatten() {
        (tenant.id.0, "inbound".to_string())
    } else {
        warn!(from = %from, "inbound call from unrecognized number");
        (String::new(), "inbound".to_string())
    };

    info!(call_sid, senior_id, "answering call");

    let instruction = ConnectInstruction::new(
        format!("{}/voice/stream", state.config.public_base_url.replace("https://", "wss://").replace("http://", "ws://")),
        StreamCustomParameters {
            senior_id,
            conversation_id: uuid::Uuid::new_v4().to_string(),
            call_type,
        },
    );
    Ok(Json(instruction))
}

/// POST /voice/status
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let url = format!("{}/voice/status", state.config.public_base_url);
    verify(&state, &url, &body, &headers)?;

    let callback: StatusCallback =
        serde_urlencoded::from_bytes(&body).map_err(|_| bad_request("malformed status callback"))?;

    info!(call_sid = %callback.call_sid, status = ?callback.call_status, "status callback");

    if let Some(engine) = &state.scheduler {
        if callback.call_status.is_terminal() {
            let answered = callback.call_status == voicecall_protocol::frames::CallStatus::Completed;
            if let Err(e) = engine.record_outcome_by_call_sid(&callback.call_sid, answered) {
                warn!(call_sid = %callback.call_sid, error = %e, "failed to record call outcome");
            }
        }
    }

    Ok(Json(json!({"ok": true})))
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

fn unauthorized(reason: &str) -> (StatusCode, Json<Value>) {
    warn!(reason, "webhook signature verification failed");
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "signature verification failed"})))
}
