//! Tenant administration: the gateway is the only crate that owns a
//! `tenants` table, since every other crate only ever needs a `TenantId` to
//! key its own storage by (§4.2, §4.9 step 1).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Timelike;
use rusqlite::{Connection, OptionalExtension};
use voicecall_context::{DailyContextStore, GreetingRotator, TodaysContext};
use voicecall_core::types::{Tenant, TenantId};
use voicecall_memory::MemoryManager;

use voicecall_scheduler::dialer::TenantDirectory as SchedulerTenantDirectory;
use voicecall_session::SessionDirectory;

pub struct TenantStore {
    db: Mutex<Connection>,
    memory: Arc<MemoryManager>,
    daily_context: Arc<DailyContextStore>,
    greeting_rotator: Arc<GreetingRotator>,
}

impl TenantStore {
    pub fn new(
        conn: Connection,
        memory: Arc<MemoryManager>,
        daily_context: Arc<DailyContextStore>,
        greeting_rotator: Arc<GreetingRotator>,
    ) -> rusqlite::Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            memory,
            daily_context,
            greeting_rotator,
        })
    }

    pub fn create(&self, tenant: &Tenant) -> rusqlite::Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tenants (id, name, phone, timezone, interests, family_info,
                                   medical_notes, quiet_hours_start, quiet_hours_end, active)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                timezone = excluded.timezone,
                interests = excluded.interests,
                family_info = excluded.family_info,
                medical_notes = excluded.medical_notes,
                quiet_hours_start = excluded.quiet_hours_start,
                quiet_hours_end = excluded.quiet_hours_end,
                active = excluded.active",
            rusqlite::params![
                tenant.id.as_str(),
                tenant.name,
                tenant.phone,
                tenant.timezone,
                serde_json::to_string(&tenant.interests).unwrap_or_else(|_| "[]".to_string()),
                tenant.family_info,
                tenant.medical_notes,
                tenant.quiet_hours_start,
                tenant.quiet_hours_end,
                tenant.active,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, tenant_id: &str) -> rusqlite::Result<Option<Tenant>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, name, phone, timezone, interests, family_info, medical_notes,
                    quiet_hours_start, quiet_hours_end, active
             FROM tenants WHERE id = ?1",
            [tenant_id],
            row_to_tenant,
        )
        .optional()
    }

    pub fn get_by_phone(&self, phone: &str) -> rusqlite::Result<Option<Tenant>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, name, phone, timezone, interests, family_info, medical_notes,
                    quiet_hours_start, quiet_hours_end, active
             FROM tenants WHERE phone = ?1",
            [phone],
            row_to_tenant,
        )
        .optional()
    }

    pub fn active_ids(&self) -> rusqlite::Result<Vec<TenantId>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT id FROM tenants WHERE active = 1")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .map(TenantId::from)
            .collect();
        Ok(ids)
    }
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    let interests: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    Ok(Tenant {
        id: TenantId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        phone: row.get(2)?,
        timezone: row.get(3)?,
        interests,
        family_info: row.get(5)?,
        medical_notes: row.get(6)?,
        quiet_hours_start: row.get(7)?,
        quiet_hours_end: row.get(8)?,
        active: row.get::<_, i64>(9)? != 0,
    })
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenants (
            id                 TEXT PRIMARY KEY NOT NULL,
            name               TEXT NOT NULL,
            phone              TEXT NOT NULL UNIQUE,
            timezone           TEXT NOT NULL,
            interests          TEXT NOT NULL DEFAULT '[]',
            family_info        TEXT,
            medical_notes      TEXT,
            quiet_hours_start  INTEGER,
            quiet_hours_end    INTEGER,
            active             INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_tenants_phone ON tenants (phone);",
    )
}

#[async_trait]
impl SessionDirectory for TenantStore {
    async fn tenant_by_phone(&self, phone: &str) -> Option<Tenant> {
        self.get_by_phone(phone).ok().flatten()
    }

    async fn tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.get(tenant_id).ok().flatten()
    }
}

#[async_trait]
impl SchedulerTenantDirectory for TenantStore {
    fn timezone(&self, tenant_id: &str) -> Option<String> {
        self.get(tenant_id).ok().flatten().map(|t| t.timezone)
    }

    fn active_tenant_ids(&self) -> Vec<TenantId> {
        self.active_ids().unwrap_or_default()
    }

    async fn prefetch_context(
        &self,
        tenant_id: &TenantId,
    ) -> Option<voicecall_context::ContextCacheEntry> {
        let tenant = self.get(tenant_id.as_str()).ok().flatten()?;

        let local_hour = tenant
            .timezone
            .parse::<chrono_tz::Tz>()
            .map(|tz| chrono::Utc::now().with_timezone(&tz).hour())
            .unwrap_or(12);
        let greeting_template = self
            .greeting_rotator
            .next_template(tenant.id.as_str(), local_hour)
            .to_string();

        let memory_context = self.memory.build_context(tenant.id.as_str()).unwrap_or_default();
        let daily_context = self
            .daily_context
            .get_todays_context(tenant.id.as_str(), &tenant.timezone)
            .map(|ctx| render_todays_context(&ctx))
            .unwrap_or_default();

        Some(voicecall_context::ContextCacheEntry {
            memory_context,
            daily_context,
            greeting_template,
            prior_call_summaries: Vec::new(),
            news_headlines: Vec::new(),
            prefetched_at: chrono::Utc::now(),
        })
    }
}

fn render_todays_context(ctx: &TodaysContext) -> String {
    let mut lines = Vec::new();
    if !ctx.highlights.is_empty() {
        lines.push(format!("Already discussed today: {}", ctx.highlights.join("; ")));
    }
    if !ctx.reminders_delivered.is_empty() {
        lines.push(format!("Reminders already delivered today: {}", ctx.reminders_delivered.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use voicecall_llm::{ChatResponse, EmbeddingProvider, LlmProvider, ProviderError};

    use super::*;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct FakeLlm;

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _req: &voicecall_llm::ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "[]".to_string(),
                model: "fake".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn test_store() -> TenantStore {
        let mem_conn = Connection::open_in_memory().unwrap();
        voicecall_memory::init_db(&mem_conn).unwrap();
        let memory = Arc::new(MemoryManager::new(mem_conn, Arc::new(FakeEmbedder), Arc::new(FakeLlm), "fake-model"));

        let daily_conn = Connection::open_in_memory().unwrap();
        voicecall_context::daily::init_db(&daily_conn).unwrap();
        let daily_context = Arc::new(DailyContextStore::new(daily_conn));

        TenantStore::new(
            Connection::open_in_memory().unwrap(),
            memory,
            daily_context,
            Arc::new(GreetingRotator::new()),
        )
        .unwrap()
    }

    fn sample_tenant() -> Tenant {
        Tenant {
            id: TenantId::from("tenant-1"),
            name: "Dorothy".to_string(),
            phone: "+15550100".to_string(),
            timezone: "America/New_York".to_string(),
            interests: vec!["gardening".to_string()],
            family_info: Some("daughter Anne calls weekly".to_string()),
            medical_notes: None,
            quiet_hours_start: Some(21 * 60),
            quiet_hours_end: Some(8 * 60),
            active: true,
        }
    }

    #[test]
    fn create_then_lookup_by_id_and_phone_round_trips() {
        let store = test_store();
        let tenant = sample_tenant();
        store.create(&tenant).unwrap();

        let by_id = store.get("tenant-1").unwrap().unwrap();
        assert_eq!(by_id.name, "Dorothy");
        assert_eq!(by_id.interests, vec!["gardening".to_string()]);

        let by_phone = store.get_by_phone("+15550100").unwrap().unwrap();
        assert_eq!(by_phone.id.as_str(), "tenant-1");
    }

    #[test]
    fn inactive_tenant_excluded_from_active_ids() {
        let store = test_store();
        let mut inactive = sample_tenant();
        inactive.id = TenantId::from("tenant-2");
        inactive.phone = "+15550200".to_string();
        inactive.active = false;
        store.create(&sample_tenant()).unwrap();
        store.create(&inactive).unwrap();

        let ids = store.active_ids().unwrap();
        assert_eq!(ids, vec![TenantId::from("tenant-1")]);
    }

    #[test]
    fn unknown_id_returns_none() {
        let store = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[tokio::test]
    async fn prefetch_context_builds_an_entry_for_a_known_tenant() {
        let store = test_store();
        store.create(&sample_tenant()).unwrap();

        let entry = SchedulerTenantDirectory::prefetch_context(&store, &TenantId::from("tenant-1"))
            .await
            .unwrap();
        assert!(!entry.greeting_template.is_empty());
    }

    #[tokio::test]
    async fn prefetch_context_returns_none_for_unknown_tenant() {
        let store = test_store();
        let entry =
            SchedulerTenantDirectory::prefetch_context(&store, &TenantId::from("nope")).await;
        assert!(entry.is_none());
    }
}
