use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{error, info, warn};

use voicecall_conversations::ConversationManager;
use voicecall_context::{daily, ContextCache, DailyContextStore, GreetingRotator};
use voicecall_core::config::VoicecallConfig;
use voicecall_llm::anthropic::AnthropicProvider;
use voicecall_llm::embedding::HttpEmbeddingProvider;
use voicecall_memory::MemoryManager;
use voicecall_protocol::stt::HttpSttProvider;
use voicecall_protocol::tts::{HttpTtsProvider, VoiceConfig};
use voicecall_scheduler::{ReminderStore, SchedulerEngine};
use voicecall_session::SessionDeps;

mod app;
mod http;
mod telephony;
mod tenants;
mod transport;
mod ws;

use tenants::TenantStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicecall_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > VOICECALL_CONFIG env > ~/.voicecall/voicecall.toml
    let config_path = std::env::var("VOICECALL_CONFIG").ok();
    let config = match VoicecallConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("config load failed: {e}");
            std::process::exit(1);
        }
    };

    let db_path = config
        .database_url
        .strip_prefix("sqlite://")
        .unwrap_or(&config.database_url)
        .to_string();
    if let Some(parent) = Path::new(&db_path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("failed to create database directory: {e}");
            std::process::exit(1);
        }
    }

    let conversations_conn = match Connection::open(&db_path) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to open database: {e}");
            std::process::exit(1);
        }
    };
    let conversations = match ConversationManager::new(conversations_conn) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("failed to initialize conversations store: {e}");
            std::process::exit(1);
        }
    };

    let memory_conn = Connection::open(&db_path)?;
    voicecall_memory::init_db(&memory_conn)?;
    let daily_conn = Connection::open(&db_path)?;
    daily::init_db(&daily_conn)?;
    let tenants_conn = Connection::open(&db_path)?;

    let ping_conn = Connection::open(&db_path)?;

    let embedder = Arc::new(HttpEmbeddingProvider::new(
        config.providers.embedding_key.clone(),
        None,
        None,
    ));
    let memory = Arc::new(MemoryManager::new(
        memory_conn,
        embedder,
        Arc::new(AnthropicProvider::new(config.providers.llm_analysis_key.clone(), None)),
        config.analysis_model.clone(),
    ));

    let daily_context = Arc::new(DailyContextStore::new(daily_conn));
    let context_cache = Arc::new(ContextCache::new());
    let greeting_rotator = Arc::new(GreetingRotator::new());

    let tenants = match TenantStore::new(
        tenants_conn,
        memory.clone(),
        daily_context.clone(),
        greeting_rotator.clone(),
    ) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!("failed to initialize tenant store: {e}");
            std::process::exit(1);
        }
    };

    let voice_llm = Arc::new(AnthropicProvider::new(config.providers.llm_voice_key.clone(), None));
    let director_llm = Arc::new(AnthropicProvider::new(config.providers.llm_director_key.clone(), None));
    let analysis_llm = Arc::new(AnthropicProvider::new(config.providers.llm_analysis_key.clone(), None));
    let stt = Arc::new(HttpSttProvider::new(config.providers.stt_key.clone(), None));
    let tts = Arc::new(HttpTtsProvider::new(config.providers.tts_key.clone(), None));

    let voice_config = VoiceConfig {
        voice_id: config.tts_tuning.voice_id.clone(),
        stability: config.tts_tuning.tts_stability,
        similarity_boost: config.tts_tuning.tts_similarity_boost,
        style: config.tts_tuning.tts_style,
        use_speaker_boost: true,
        speed: config.tts_tuning.tts_speed,
    };

    // Two independent `ReminderStore` handles over the same file: one the
    // session's `mark_reminder_acknowledged` tool reads/writes through, one
    // the scheduler engine owns outright for its tick loop. Same pattern as
    // every other per-concern store in this workspace (separate `Connection`
    // per manager, never a shared one).
    let reminder_store = if config.scheduler_enabled {
        let session_reminders_conn = Connection::open(&db_path)?;
        Some(Arc::new(ReminderStore::new(session_reminders_conn)?))
    } else {
        None
    };
    let scheduler_reminder_store = if config.scheduler_enabled {
        let engine_reminders_conn = Connection::open(&db_path)?;
        Some(ReminderStore::new(engine_reminders_conn)?)
    } else {
        None
    };

    let session_deps = Arc::new(SessionDeps {
        directory: tenants.clone(),
        stt,
        tts,
        voice_llm,
        voice_model: config.voice_model.clone(),
        director_llm,
        director_model: config.director_model.clone(),
        analysis_llm,
        analysis_model: config.analysis_model.clone(),
        voice_config,
        conversations,
        memory,
        context_cache: context_cache.clone(),
        daily_context,
        greeting_rotator,
        reminder_store: reminder_store.clone(),
        news: Arc::new(voicecall_session::LlmNewsProvider::new(
            Arc::new(AnthropicProvider::new(config.providers.llm_analysis_key.clone(), None)),
            config.analysis_model.clone(),
        )),
        max_call_minutes: config.max_call_minutes,
        streaming_enabled: config.streaming_enabled,
    });

    let (scheduler_shutdown_tx, scheduler_shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler = if let Some(store) = scheduler_reminder_store {
        let dialer = Arc::new(telephony::TelephonyClient::new(
            config.telephony.clone(),
            tenants.clone(),
            &config.public_base_url,
        ));
        let engine = Arc::new(SchedulerEngine::new(
            store,
            context_cache.clone(),
            dialer,
            tenants.clone(),
        ));
        tokio::spawn(engine.clone().run(scheduler_shutdown_rx));
        Some(engine)
    } else {
        None
    };

    let bind = config.bind.clone();
    let port = config.port;
    let state = Arc::new(app::AppState::new(
        config,
        tenants,
        session_deps,
        scheduler,
        Arc::new(std::sync::Mutex::new(ping_conn)),
    ));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("voicecall gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = scheduler_shutdown_tx.send(true);
    info!("voicecall gateway shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    warn!("shutdown signal received, draining connections");
}
