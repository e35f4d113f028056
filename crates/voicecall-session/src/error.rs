#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no startup context could be resolved for this call")]
    UnresolvedStartup,

    #[error("conversation store error: {0}")]
    Conversation(#[from] voicecall_conversations::ConversationError),

    #[error("context store error: {0}")]
    Context(#[from] voicecall_context::ContextError),

    #[error("transport closed before the call could start")]
    TransportClosed,
}
