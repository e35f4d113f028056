use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{error, info, warn};

use voicecall_context::{should_prefetch_now, ContextCache};

use crate::dialer::{OutboundDialer, TenantDirectory};
use crate::error::Result;
use crate::store::ReminderStore;
use crate::types::{PendingReminderContext, Reminder, TenantId};

/// Drives the reminder-delivery tick loop (§4.12): one-shot/recurring/retry
/// selection, advisory-locked claiming, outbound dial, and the hourly daily
/// context pre-fetch trigger.
pub struct SchedulerEngine {
    store: ReminderStore,
    context_cache: Arc<ContextCache>,
    dialer: Arc<dyn OutboundDialer>,
    directory: Arc<dyn TenantDirectory>,
    /// Call-SID-keyed pre-fetched context for calls the scheduler is about to
    /// place, consumed by the session orchestrator at startup (§4.10 step 1).
    pending: Arc<DashMap<String, PendingReminderContext>>,
    prev_tick: AsyncMutex<DateTime<Utc>>,
    last_daily_prefetch: DashMap<String, DateTime<Utc>>,
}

impl SchedulerEngine {
    pub fn new(
        store: ReminderStore,
        context_cache: Arc<ContextCache>,
        dialer: Arc<dyn OutboundDialer>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            store,
            context_cache,
            dialer,
            directory,
            pending: Arc::new(DashMap::new()),
            prev_tick: AsyncMutex::new(Utc::now()),
            last_daily_prefetch: DashMap::new(),
        }
    }

    /// Shared handle for the session orchestrator to pull pre-fetched
    /// reminder-call context out of once the transport opens for that SID.
    pub fn pending_contexts(&self) -> Arc<DashMap<String, PendingReminderContext>> {
        Arc::clone(&self.pending)
    }

    /// Main loop. Ticks every 60 s until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("reminder scheduler started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Exposed for status callbacks from the telephony adapter: records
    /// whether a placed call was answered, and retries/exhausts accordingly
    /// (§4.12 step 4).
    pub fn record_outcome(&self, delivery_id: &str, answered: bool) -> Result<()> {
        self.store.mark_outcome(delivery_id, answered)?;
        Ok(())
    }

    /// Same as [`Self::record_outcome`], keyed by the telephony provider's
    /// call SID instead — what `/voice/status` actually has on hand. No-op
    /// if the SID doesn't belong to a scheduler-placed delivery (manual
    /// outbound and inbound calls don't go through here).
    pub fn record_outcome_by_call_sid(&self, call_sid: &str, answered: bool) -> Result<()> {
        if let Some(delivery_id) = self.store.delivery_id_by_call_sid(call_sid)? {
            self.store.mark_outcome(&delivery_id, answered)?;
        }
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let prev = {
            let mut guard = self.prev_tick.lock().await;
            let prev = *guard;
            *guard = now;
            prev
        };

        for reminder in self.store.due_one_shot(now)? {
            let scheduled_for = reminder.scheduled_time.unwrap_or(now);
            self.process_due(reminder, scheduled_for).await;
        }

        let directory = Arc::clone(&self.directory);
        for (reminder, occurrence) in self.store.due_recurring(prev, now, |tid| directory.timezone(tid))? {
            self.process_due(reminder, occurrence).await;
        }

        for delivery in self.store.retry_pending(now)? {
            let Some(reminder) = self.store.get_reminder(&delivery.reminder_id)? else {
                warn!(reminder_id = %delivery.reminder_id, "retry-pending delivery has no reminder; skipping");
                continue;
            };
            self.store.begin_retry_attempt(&delivery.id)?;
            self.dial_and_record(&reminder, &delivery.id).await;
        }

        self.run_daily_prefetch(now).await;
        Ok(())
    }

    /// Claims the occurrence, then dials. No-op if another worker already
    /// claimed it (§4.12 step 1 advisory lock).
    async fn process_due(&self, reminder: Reminder, scheduled_for: DateTime<Utc>) {
        let claimed = match self.store.claim_delivery(&reminder.id, scheduled_for) {
            Ok(Some(d)) => d,
            Ok(None) => return,
            Err(e) => {
                error!(reminder_id = %reminder.id, error = %e, "failed to claim delivery");
                return;
            }
        };
        self.dial_and_record(&reminder, &claimed.id).await;
    }

    async fn dial_and_record(&self, reminder: &Reminder, delivery_id: &str) {
        let prefetched = self.directory.prefetch_context(&reminder.tenant_id).await;

        match self.dialer.dial(&reminder.tenant_id, reminder).await {
            Ok(call_sid) => {
                if let Err(e) = self.store.attach_call_sid(delivery_id, &call_sid) {
                    error!(delivery_id, error = %e, "failed to attach call sid");
                }
                if let Some(context) = prefetched {
                    self.pending.insert(
                        call_sid.0.clone(),
                        PendingReminderContext {
                            tenant_id: reminder.tenant_id.clone(),
                            reminder: reminder.clone(),
                            delivery_id: delivery_id.to_string(),
                            context,
                        },
                    );
                }
                info!(reminder_id = %reminder.id, %call_sid, "reminder dial placed");
            }
            Err(e) => {
                warn!(reminder_id = %reminder.id, error = %e, "outbound dial failed");
                if let Err(e) = self.store.mark_outcome(delivery_id, false) {
                    error!(delivery_id, error = %e, "failed to record dial failure");
                }
            }
        }
    }

    /// Idempotent per tenant per local day — safe to call every tick even
    /// though the nominal cadence is hourly (§4.11, §4.12).
    async fn run_daily_prefetch(&self, now: DateTime<Utc>) {
        for tenant_id in self.directory.active_tenant_ids() {
            let Some(tz_name) = self.directory.timezone(&tenant_id.0) else {
                continue;
            };
            let last = self.last_daily_prefetch.get(&tenant_id.0).map(|v| *v);
            match should_prefetch_now(&tz_name, now, last) {
                Ok(true) => {
                    if let Some(entry) = self.directory.prefetch_context(&tenant_id).await {
                        self.context_cache.put(&tenant_id.0, entry);
                        self.last_daily_prefetch.insert(tenant_id.0.clone(), now);
                        info!(tenant_id = %tenant_id.0, "daily context pre-fetched");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(tenant_id = %tenant_id.0, error = %e, "daily pre-fetch check failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallSid, ReminderType};
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockDialer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl OutboundDialer for MockDialer {
        async fn dial(&self, _tenant_id: &TenantId, _reminder: &Reminder) -> std::result::Result<CallSid, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("no answer".to_string())
            } else {
                Ok(CallSid("CA-test".to_string()))
            }
        }
    }

    struct MockDirectory;

    #[async_trait]
    impl TenantDirectory for MockDirectory {
        fn timezone(&self, _tenant_id: &str) -> Option<String> {
            Some("UTC".to_string())
        }

        fn active_tenant_ids(&self) -> Vec<TenantId> {
            vec![TenantId("tenant-1".to_string())]
        }

        async fn prefetch_context(&self, _tenant_id: &TenantId) -> Option<voicecall_context::ContextCacheEntry> {
            None
        }
    }

    fn reminder(id: &str, scheduled_time: DateTime<Utc>) -> Reminder {
        Reminder {
            id: id.to_string(),
            tenant_id: TenantId("tenant-1".to_string()),
            reminder_type: ReminderType::Medication,
            title: "Pill".to_string(),
            description: None,
            scheduled_time: Some(scheduled_time),
            recurrence: None,
            active: true,
            last_delivered_at: None,
        }
    }

    #[tokio::test]
    async fn due_one_shot_reminder_is_dialed_exactly_once() {
        let store = ReminderStore::new(Connection::open_in_memory().unwrap()).unwrap();
        store.upsert_reminder(&reminder("r1", Utc::now() - chrono::Duration::minutes(1))).unwrap();

        let dialer = Arc::new(MockDialer { calls: AtomicUsize::new(0), fail: false });
        let engine = SchedulerEngine::new(store, Arc::new(ContextCache::new()), dialer.clone(), Arc::new(MockDirectory));

        engine.tick().await.unwrap();
        engine.tick().await.unwrap();

        assert_eq!(dialer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pending_contexts().len(), 0); // MockDirectory never returns a context
    }

    #[tokio::test]
    async fn failed_dial_schedules_a_retry() {
        let store = ReminderStore::new(Connection::open_in_memory().unwrap()).unwrap();
        store.upsert_reminder(&reminder("r1", Utc::now() - chrono::Duration::minutes(1))).unwrap();

        let dialer = Arc::new(MockDialer { calls: AtomicUsize::new(0), fail: true });
        let engine = SchedulerEngine::new(store, Arc::new(ContextCache::new()), dialer, Arc::new(MockDirectory));

        engine.tick().await.unwrap();
        // Not due again until 30 minutes have passed.
        assert_eq!(engine.store.retry_pending(Utc::now()).unwrap().len(), 0);
        assert_eq!(
            engine.store.retry_pending(Utc::now() + chrono::Duration::minutes(31)).unwrap().len(),
            1
        );
    }
}
