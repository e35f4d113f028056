use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe. Degrades to 503 once persistence stops
/// answering, which is what the exit-code-0 health-drain shutdown path
/// watches for (§6).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let persistence_ok = state.ping_persistence();

    let status = if persistence_ok { "ok" } else { "degraded" };
    let code = if persistence_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "active_calls": state.active_calls.len(),
            "scheduler_enabled": state.scheduler.is_some(),
        })),
    )
}
