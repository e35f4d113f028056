use std::str::FromStr;
use std::sync::Mutex;

use chrono::NaiveDate;
use chrono_tz::Tz;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::ContextError;

pub fn init_db(conn: &Connection) -> Result<(), ContextError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_context (
            tenant_id           TEXT NOT NULL,
            local_date          TEXT NOT NULL,
            call_sid            TEXT NOT NULL,
            topics              TEXT NOT NULL DEFAULT '[]',
            reminders_delivered TEXT NOT NULL DEFAULT '[]',
            advice              TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            PRIMARY KEY (tenant_id, call_sid)
        );
        CREATE INDEX IF NOT EXISTS idx_daily_context_tenant_date
            ON daily_context(tenant_id, local_date);",
    )?;
    Ok(())
}

/// What the session orchestrator hands the store at the end of a call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContextUpdate {
    pub topics: Vec<String>,
    pub reminders_delivered: Vec<String>,
    pub advice: Vec<String>,
}

/// Aggregated view of everything recorded for a tenant's current local day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodaysContext {
    pub topics: Vec<String>,
    pub reminders_delivered: Vec<String>,
    pub advice: Vec<String>,
    pub highlights: Vec<String>,
}

/// Per-call-SID idempotent store of what happened today, bucketed by the
/// tenant's local date at call start (§4.14).
pub struct DailyContextStore {
    db: Mutex<Connection>,
}

impl DailyContextStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    pub fn local_today(tz_name: &str, now: chrono::DateTime<chrono::Utc>) -> Result<NaiveDate, ContextError> {
        let tz = Tz::from_str(tz_name).map_err(|_| ContextError::UnknownTimezone(tz_name.to_string()))?;
        Ok(now.with_timezone(&tz).date_naive())
    }

    /// Idempotent per `call_sid`: calling this twice for the same call just
    /// overwrites that call's row rather than double-counting.
    pub fn save_call_context(
        &self,
        tenant_id: &str,
        call_sid: &str,
        local_date: NaiveDate,
        update: &CallContextUpdate,
    ) -> Result<(), ContextError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO daily_context (tenant_id, local_date, call_sid, topics, reminders_delivered, advice, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, call_sid) DO UPDATE SET
                topics = excluded.topics,
                reminders_delivered = excluded.reminders_delivered,
                advice = excluded.advice",
            rusqlite::params![
                tenant_id,
                local_date.to_string(),
                call_sid,
                serde_json::to_string(&update.topics)?,
                serde_json::to_string(&update.reminders_delivered)?,
                serde_json::to_string(&update.advice)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_todays_context(&self, tenant_id: &str, tz_name: &str) -> Result<TodaysContext, ContextError> {
        let today = Self::local_today(tz_name, chrono::Utc::now())?;
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT topics, reminders_delivered, advice FROM daily_context
             WHERE tenant_id = ?1 AND local_date = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant_id, today.to_string()], |row| {
            let topics: String = row.get(0)?;
            let reminders: String = row.get(1)?;
            let advice: String = row.get(2)?;
            Ok((topics, reminders, advice))
        })?;

        let mut ctx = TodaysContext::default();
        for row in rows.filter_map(|r| r.ok()) {
            let topics: Vec<String> = serde_json::from_str(&row.0).unwrap_or_default();
            let reminders: Vec<String> = serde_json::from_str(&row.1).unwrap_or_default();
            let advice: Vec<String> = serde_json::from_str(&row.2).unwrap_or_default();
            ctx.topics.extend(topics);
            ctx.reminders_delivered.extend(reminders);
            ctx.advice.extend(advice);
        }
        ctx.highlights = ctx.topics.iter().take(3).cloned().collect();
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DailyContextStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        DailyContextStore::new(conn)
    }

    #[test]
    fn saving_twice_for_same_call_sid_is_idempotent() {
        let store = store();
        let today = today_utc();
        let update = CallContextUpdate {
            topics: vec!["garden".to_string()],
            reminders_delivered: vec!["med-1".to_string()],
            advice: vec![],
        };
        store.save_call_context("tenant-1", "CA123", today, &update).unwrap();
        store.save_call_context("tenant-1", "CA123", today, &update).unwrap();

        let ctx = store.get_todays_context("tenant-1", "UTC").unwrap();
        assert_eq!(ctx.topics, vec!["garden".to_string()]);
        assert_eq!(ctx.reminders_delivered.len(), 1);
    }

    fn today_utc() -> NaiveDate {
        DailyContextStore::local_today("UTC", chrono::Utc::now()).unwrap()
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let store = store();
        let err = store.get_todays_context("tenant-1", "Not/AZone");
        assert!(err.is_err());
    }
}
