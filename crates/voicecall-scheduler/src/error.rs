use thiserror::Error;

/// Errors that can occur within the reminder scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reminder's `recurrence` string didn't parse (§4.2).
    #[error("Invalid recurrence expression '{0}'")]
    InvalidRecurrence(String),

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    /// No delivery exists with the given ID.
    #[error("Delivery not found: {id}")]
    DeliveryNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
