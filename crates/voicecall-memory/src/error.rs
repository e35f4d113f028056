use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("extraction LLM error: {0}")]
    Extraction(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
