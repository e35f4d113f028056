use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;

use voicecall_core::config::VoicecallConfig;
use voicecall_scheduler::{PendingReminderContext, SchedulerEngine};
use voicecall_session::SessionDeps;

use crate::tenants::TenantStore;

/// Central shared state — passed as Arc<AppState> to all Axum handlers. One
/// instance backs every concurrent call (§5: sessions share process-wide
/// storage, never each other's mutable state).
pub struct AppState {
    pub config: VoicecallConfig,
    pub tenants: Arc<TenantStore>,
    pub session_deps: Arc<SessionDeps>,
    pub scheduler: Option<Arc<SchedulerEngine>>,
    /// Call-SID-keyed pre-fetched context for calls the scheduler just
    /// dialed, consumed by the media-stream handler at `start` (§4.10).
    pub scheduler_pending: Option<Arc<DashMap<String, PendingReminderContext>>>,
    /// Call SIDs with a live media-stream connection, tracked only so
    /// `/health` can report load; the session owns all other per-call state.
    pub active_calls: DashMap<String, ()>,
    conversations_db: Arc<std::sync::Mutex<rusqlite::Connection>>,
}

impl AppState {
    pub fn new(
        config: VoicecallConfig,
        tenants: Arc<TenantStore>,
        session_deps: Arc<SessionDeps>,
        scheduler: Option<Arc<SchedulerEngine>>,
        conversations_db: Arc<std::sync::Mutex<rusqlite::Connection>>,
    ) -> Self {
        let scheduler_pending = scheduler.as_ref().map(|s| s.pending_contexts());
        Self {
            config,
            tenants,
            session_deps,
            scheduler,
            scheduler_pending,
            active_calls: DashMap::new(),
            conversations_db,
        }
    }

    /// Backs `/health` — a trivial query against the conversations database,
    /// which every call path touches (§6, §7 degraded-mode table).
    pub fn ping_persistence(&self) -> bool {
        let Ok(conn) = self.conversations_db.lock() else {
            return false;
        };
        conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }
}

/// Assemble the full Axum router: the media-stream socket and the two
/// signed telephony webhooks (§6 Telephony).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/voice/answer", post(crate::http::voice::answer_handler))
        .route("/voice/status", post(crate::http::voice::status_handler))
        .route("/voice/stream", get(crate::ws::stream::stream_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
