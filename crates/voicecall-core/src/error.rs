use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoicecallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Telephony protocol error: {0}")]
    Protocol(String),

    #[error("Tenant not found: {id}")]
    TenantNotFound { id: String },

    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("STT provider error: {0}")]
    SttProvider(String),

    #[error("TTS provider error: {0}")]
    TtsProvider(String),

    #[error("Telephony provider error: {0}")]
    TelephonyProvider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VoicecallError {
    /// Short error code string used in logs and call-record failure reasons.
    pub fn code(&self) -> &'static str {
        match self {
            VoicecallError::Config(_) => "CONFIG_ERROR",
            VoicecallError::AuthFailed(_) => "AUTH_FAILED",
            VoicecallError::Protocol(_) => "PROTOCOL_ERROR",
            VoicecallError::TenantNotFound { .. } => "TENANT_NOT_FOUND",
            VoicecallError::ReminderNotFound { .. } => "REMINDER_NOT_FOUND",
            VoicecallError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            VoicecallError::Database(_) => "DATABASE_ERROR",
            VoicecallError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            VoicecallError::SttProvider(_) => "STT_PROVIDER_ERROR",
            VoicecallError::TtsProvider(_) => "TTS_PROVIDER_ERROR",
            VoicecallError::TelephonyProvider(_) => "TELEPHONY_PROVIDER_ERROR",
            VoicecallError::Serialization(_) => "SERIALIZATION_ERROR",
            VoicecallError::Io(_) => "IO_ERROR",
            VoicecallError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            VoicecallError::Timeout { .. } => "TIMEOUT",
            VoicecallError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, VoicecallError>;
