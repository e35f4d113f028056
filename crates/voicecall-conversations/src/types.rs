pub use voicecall_core::types::{
    CallAnalysis, CallSid, CallType, Concern, ConcernType, Conversation, ConversationId, ConversationStatus,
    Severity, TenantId, TranscriptTurn, TurnRole,
};
