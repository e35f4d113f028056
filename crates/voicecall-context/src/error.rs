use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
