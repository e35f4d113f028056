pub use voicecall_core::types::{CallSid, Delivery, DeliveryStatus, Reminder, ReminderType, TenantId};

/// Configured retry policy for a failed delivery attempt (§4.12 query 3).
pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY_MINUTES: i64 = 30;

/// Everything the session orchestrator needs to start a reminder-initiated
/// call, keyed by the call SID the scheduler minted before dialing (§4.12
/// step 2, §4.11).
#[derive(Debug, Clone)]
pub struct PendingReminderContext {
    pub tenant_id: TenantId,
    pub reminder: Reminder,
    pub delivery_id: String,
    pub context: voicecall_context::ContextCacheEntry,
}
