#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned an unparseable event: {0}")]
    Parse(String),

    #[error("stream channel closed")]
    ChannelClosed,
}
