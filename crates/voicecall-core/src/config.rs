use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CALL_MINUTES: u32 = 15;
pub const DEFAULT_DIRECTOR_MODEL: &str = "claude-haiku-4-5";
pub const DEFAULT_VOICE_MODEL: &str = "claude-sonnet-4-6";
pub const DEFAULT_ANALYSIS_MODEL: &str = "claude-haiku-4-5";
/// Hard cap on a single inbound telephony WS frame, mirroring the gateway's
/// payload guard for the old text-protocol socket.
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024;
/// How long the media-stream socket waits for a `start` event before closing.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Top-level config (voicecall.toml + VOICECALL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicecallConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Externally reachable base URL the telephony provider uses for
    /// `/voice/answer` and `/voice/status` callbacks, e.g. `https://calls.example.org`.
    pub public_base_url: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    pub telephony: TelephonyConfig,
    pub providers: ProvidersConfig,

    #[serde(default = "default_director_model")]
    pub director_model: String,

    #[serde(default = "default_voice_model")]
    pub voice_model: String,

    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    #[serde(default)]
    pub scheduler_enabled: bool,

    #[serde(default = "bool_true")]
    pub streaming_enabled: bool,

    #[serde(default = "default_max_call_minutes")]
    pub max_call_minutes: u32,

    #[serde(default)]
    pub tts_tuning: TtsTuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub account_id: String,
    pub auth_token: String,
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub llm_voice_key: String,
    pub llm_director_key: String,
    pub llm_analysis_key: String,
    pub embedding_key: String,
    pub stt_key: String,
    pub tts_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsTuning {
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_stability")]
    pub tts_stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub tts_similarity_boost: f32,
    #[serde(default)]
    pub tts_style: f32,
    #[serde(default = "default_speed")]
    pub tts_speed: f32,
}

impl Default for TtsTuning {
    fn default() -> Self {
        Self {
            voice_id: default_voice_id(),
            tts_stability: default_stability(),
            tts_similarity_boost: default_similarity_boost(),
            tts_style: 0.0,
            tts_speed: default_speed(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_voice_model() -> String {
    DEFAULT_VOICE_MODEL.to_string()
}
fn default_analysis_model() -> String {
    DEFAULT_ANALYSIS_MODEL.to_string()
}
fn default_database_url() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("sqlite://{}/.voicecall/voicecall.db", home)
}
fn default_director_model() -> String {
    DEFAULT_DIRECTOR_MODEL.to_string()
}
fn default_max_call_minutes() -> u32 {
    DEFAULT_MAX_CALL_MINUTES
}
fn default_voice_id() -> String {
    "default".to_string()
}
fn default_stability() -> f32 {
    0.5
}
fn default_similarity_boost() -> f32 {
    0.75
}
fn default_speed() -> f32 {
    1.0
}
fn bool_true() -> bool {
    true
}

impl VoicecallConfig {
    /// Load config from a TOML file with VOICECALL_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.voicecall/voicecall.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VoicecallConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VOICECALL_").split("_"))
            .extract()
            .map_err(|e| crate::error::VoicecallError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.voicecall/voicecall.toml", home)
}
