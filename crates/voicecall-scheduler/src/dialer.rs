use async_trait::async_trait;

use crate::types::{CallSid, Reminder, TenantId};

/// Seam to the telephony adapter (owned by the gateway crate, not this one).
/// `dial` returns the call SID once the outbound call has been placed —
/// answer/no-answer/busy outcomes arrive later via a status callback, fed
/// back through [`crate::engine::SchedulerEngine::record_outcome`].
#[async_trait]
pub trait OutboundDialer: Send + Sync {
    async fn dial(&self, tenant_id: &TenantId, reminder: &Reminder) -> Result<CallSid, String>;
}

/// Seam to tenant storage (owned by whichever crate ends up administering
/// tenants). The scheduler only ever needs a timezone, the active tenant
/// list, and a way to build a pre-fetch context entry.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    fn timezone(&self, tenant_id: &str) -> Option<String>;

    fn active_tenant_ids(&self) -> Vec<TenantId>;

    async fn prefetch_context(&self, tenant_id: &TenantId) -> Option<voicecall_context::ContextCacheEntry>;
}
