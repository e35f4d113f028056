use async_trait::async_trait;

use voicecall_core::types::Tenant;
use voicecall_scheduler::PendingReminderContext;

/// How this call's tenant was resolved at startup (§4.9 step 1): reminder
/// dials carry pre-fetched context keyed by call SID; manual outbound and
/// inbound calls resolve by phone number instead.
pub enum StartupLookup {
    ReminderInitiated(PendingReminderContext),
    ManualOutbound { tenant_id: String },
    Inbound { caller_phone: String },
}

/// Seam to tenant storage (owned by whichever crate administers tenants).
/// The session only ever needs to turn a phone number or tenant ID into a
/// `Tenant` record.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn tenant_by_phone(&self, phone: &str) -> Option<Tenant>;

    async fn tenant(&self, tenant_id: &str) -> Option<Tenant>;
}
