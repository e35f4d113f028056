use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{CallSid, Delivery, DeliveryStatus, Reminder, ReminderType, TenantId, MAX_ATTEMPTS};

/// Persists reminders and their delivery attempts. Wraps a single
/// `Connection` behind a mutex, same as every other per-crate store in this
/// workspace — the scheduler tick is the only writer, so contention is
/// negligible.
pub struct ReminderStore {
    db: Mutex<Connection>,
}

impl ReminderStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Insert a reminder directly. Reminders are ordinarily created by an
    /// external admin surface; this exists for tests and for callers that
    /// own reminder CRUD themselves.
    pub fn upsert_reminder(&self, reminder: &Reminder) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO reminders (id, tenant_id, reminder_type, title, description,
                                     scheduled_time, recurrence, active, last_delivered_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                reminder_type = excluded.reminder_type,
                title = excluded.title,
                description = excluded.description,
                scheduled_time = excluded.scheduled_time,
                recurrence = excluded.recurrence,
                active = excluded.active,
                last_delivered_at = excluded.last_delivered_at",
            rusqlite::params![
                reminder.id,
                reminder.tenant_id.0,
                reminder.reminder_type.to_string(),
                reminder.title,
                reminder.description,
                reminder.scheduled_time.map(|t| t.to_rfc3339()),
                reminder.recurrence,
                reminder.active,
                reminder.last_delivered_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Active one-shot reminders whose `scheduled_time` has arrived and that
    /// have never had a delivery created (§4.12 query 1).
    pub fn due_one_shot(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT r.id, r.tenant_id, r.reminder_type, r.title, r.description,
                    r.scheduled_time, r.recurrence, r.active, r.last_delivered_at
             FROM reminders r
             WHERE r.active = 1
               AND r.scheduled_time IS NOT NULL
               AND r.scheduled_time <= ?1
               AND NOT EXISTS (SELECT 1 FROM deliveries d WHERE d.reminder_id = r.id)",
        )?;
        let rows = stmt
            .query_map([now.to_rfc3339()], row_to_reminder)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Active recurring reminders, filtered by `predicate` to those whose
    /// recurrence fires in the current tick window. Returns each reminder
    /// paired with the occurrence time it fired at, and skips any occurrence
    /// that already has a delivery row.
    pub fn due_recurring(
        &self,
        prev_tick: DateTime<Utc>,
        now: DateTime<Utc>,
        tz_for_tenant: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<(Reminder, DateTime<Utc>)>> {
        let candidates: Vec<Reminder> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id, tenant_id, reminder_type, title, description,
                        scheduled_time, recurrence, active, last_delivered_at
                 FROM reminders WHERE active = 1 AND recurrence IS NOT NULL",
            )?;
            stmt.query_map([], row_to_reminder)?.filter_map(|r| r.ok()).collect()
        };

        let mut due = Vec::new();
        for reminder in candidates {
            let recurrence = match &reminder.recurrence {
                Some(r) => r,
                None => continue,
            };
            let Some(tz_name) = tz_for_tenant(&reminder.tenant_id.0) else {
                continue;
            };
            match crate::recurrence::occurrence_in_window(recurrence, &tz_name, prev_tick, now) {
                Ok(Some(occurrence)) => {
                    if !self.has_delivery_for_occurrence(&reminder.id, occurrence)? {
                        due.push((reminder, occurrence));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(reminder_id = %reminder.id, error = %e, "skipping reminder with bad recurrence");
                }
            }
        }
        Ok(due)
    }

    fn has_delivery_for_occurrence(&self, reminder_id: &str, scheduled_for: DateTime<Utc>) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM deliveries WHERE reminder_id = ?1 AND scheduled_for = ?2",
            rusqlite::params![reminder_id, scheduled_for.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Deliveries in `retry_pending` ready for another attempt (§4.12 query 3).
    pub fn retry_pending(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, reminder_id, scheduled_for, delivered_at, acknowledged_at,
                    status, attempt_count, call_sid, user_response
             FROM deliveries
             WHERE status = 'retry_pending' AND attempt_count < ?1",
        )?;
        let retry_threshold = now - chrono::Duration::minutes(crate::types::RETRY_DELAY_MINUTES);
        let rows: Vec<Delivery> = stmt
            .query_map([MAX_ATTEMPTS], row_to_delivery)?
            .filter_map(|r| r.ok())
            .filter(|d| d.scheduled_for <= retry_threshold)
            .collect();
        Ok(rows)
    }

    /// Claim a reminder occurrence by inserting its delivery row. Returns
    /// `None` if another worker already claimed it first — the unique index
    /// on `(reminder_id, scheduled_for)` is the source of truth (§4.12 step 1).
    pub fn claim_delivery(&self, reminder_id: &str, scheduled_for: DateTime<Utc>) -> Result<Option<Delivery>> {
        let db = self.db.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO deliveries
                (id, reminder_id, scheduled_for, status, attempt_count)
             VALUES (?1, ?2, ?3, 'pending', 1)",
            rusqlite::params![id, reminder_id, scheduled_for.to_rfc3339()],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(Delivery {
            id,
            reminder_id: reminder_id.to_string(),
            scheduled_for,
            delivered_at: None,
            acknowledged_at: None,
            status: DeliveryStatus::Pending,
            attempt_count: 1,
            call_sid: None,
            user_response: None,
        }))
    }

    pub fn attach_call_sid(&self, delivery_id: &str, call_sid: &CallSid) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE deliveries SET call_sid = ?1 WHERE id = ?2",
            rusqlite::params![call_sid.0, delivery_id],
        )?;
        Ok(())
    }

    /// Bump `attempt_count` for an existing retry and flip it back to
    /// `pending` while the new dial is in flight.
    pub fn begin_retry_attempt(&self, delivery_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE deliveries SET status = 'pending', attempt_count = attempt_count + 1 WHERE id = ?1",
            [delivery_id],
        )?;
        Ok(())
    }

    /// Record the outcome of a dial attempt (§4.12 step 4): `answered` moves
    /// the delivery to `delivered`; otherwise it moves to `retry_pending` if
    /// attempts remain, else `max_attempts`.
    pub fn mark_outcome(&self, delivery_id: &str, answered: bool) -> Result<DeliveryStatus> {
        let db = self.db.lock().unwrap();
        let attempt_count: u32 = db
            .query_row("SELECT attempt_count FROM deliveries WHERE id = ?1", [delivery_id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| SchedulerError::DeliveryNotFound { id: delivery_id.to_string() })?;

        let new_status = if answered {
            DeliveryStatus::Delivered
        } else if attempt_count < MAX_ATTEMPTS {
            DeliveryStatus::RetryPending
        } else {
            DeliveryStatus::MaxAttempts
        };

        db.execute(
            "UPDATE deliveries SET status = ?1, delivered_at = ?2 WHERE id = ?3",
            rusqlite::params![
                new_status.to_string(),
                answered.then(|| Utc::now().to_rfc3339()),
                delivery_id,
            ],
        )?;
        if answered {
            db.execute(
                "UPDATE reminders SET last_delivered_at = ?1
                 WHERE id = (SELECT reminder_id FROM deliveries WHERE id = ?2)",
                rusqlite::params![Utc::now().to_rfc3339(), delivery_id],
            )?;
        }
        Ok(new_status)
    }

    /// Driven by `mark_reminder_acknowledged` (§4.6): idempotent, a second
    /// acknowledgment on an already-terminal delivery is a no-op.
    pub fn mark_acknowledged(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
        user_response: Option<&str>,
    ) -> Result<bool> {
        debug_assert!(matches!(status, DeliveryStatus::Acknowledged | DeliveryStatus::Confirmed));
        let db = self.db.lock().unwrap();
        let current: Option<String> = db
            .query_row("SELECT status FROM deliveries WHERE id = ?1", [delivery_id], |row| row.get(0))
            .optional()?;
        let Some(current) = current else {
            return Err(SchedulerError::DeliveryNotFound { id: delivery_id.to_string() });
        };
        let current: DeliveryStatus = current.parse().unwrap_or(DeliveryStatus::Pending);
        if current.is_terminal() {
            return Ok(false);
        }
        db.execute(
            "UPDATE deliveries SET status = ?1, acknowledged_at = ?2, user_response = ?3 WHERE id = ?4",
            rusqlite::params![status.to_string(), Utc::now().to_rfc3339(), user_response, delivery_id],
        )?;
        Ok(true)
    }

    pub fn get_reminder(&self, reminder_id: &str) -> Result<Option<Reminder>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, reminder_type, title, description,
                    scheduled_time, recurrence, active, last_delivered_at
             FROM reminders WHERE id = ?1",
            [reminder_id],
            row_to_reminder,
        )
        .optional()
        .map_err(SchedulerError::from)
    }

    pub fn get_delivery(&self, delivery_id: &str) -> Result<Delivery> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, reminder_id, scheduled_for, delivered_at, acknowledged_at,
                    status, attempt_count, call_sid, user_response
             FROM deliveries WHERE id = ?1",
            [delivery_id],
            row_to_delivery,
        )
        .optional()?
        .ok_or_else(|| SchedulerError::DeliveryNotFound { id: delivery_id.to_string() })
    }

    /// Resolve the delivery a `/voice/status` callback's call SID belongs to
    /// (§4.12 step 4) — the callback only carries the telephony provider's
    /// call SID, not our delivery ID.
    pub fn delivery_id_by_call_sid(&self, call_sid: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id FROM deliveries WHERE call_sid = ?1",
            [call_sid],
            |row| row.get(0),
        )
        .optional()
        .map_err(SchedulerError::from)
    }
}

fn row_to_reminder(row: &rusqlite::Row) -> rusqlite::Result<Reminder> {
    let reminder_type: String = row.get(2)?;
    let scheduled_time: Option<String> = row.get(5)?;
    let last_delivered_at: Option<String> = row.get(8)?;
    Ok(Reminder {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        reminder_type: reminder_type.parse().unwrap_or(ReminderType::Custom),
        title: row.get(3)?,
        description: row.get(4)?,
        scheduled_time: scheduled_time.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        recurrence: row.get(6)?,
        active: row.get(7)?,
        last_delivered_at: last_delivered_at.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
    })
}

fn row_to_delivery(row: &rusqlite::Row) -> rusqlite::Result<Delivery> {
    let scheduled_for: String = row.get(2)?;
    let delivered_at: Option<String> = row.get(3)?;
    let acknowledged_at: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let call_sid: Option<String> = row.get(7)?;
    Ok(Delivery {
        id: row.get(0)?,
        reminder_id: row.get(1)?,
        scheduled_for: DateTime::parse_from_rfc3339(&scheduled_for)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        delivered_at: delivered_at.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        acknowledged_at: acknowledged_at.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        status: status.parse().unwrap_or(DeliveryStatus::Pending),
        attempt_count: row.get(6)?,
        call_sid: call_sid.map(CallSid),
        user_response: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> ReminderStore {
        ReminderStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn one_shot_reminder(id: &str, scheduled_time: DateTime<Utc>) -> Reminder {
        Reminder {
            id: id.to_string(),
            tenant_id: TenantId("tenant-1".to_string()),
            reminder_type: ReminderType::Medication,
            title: "Blood pressure pill".to_string(),
            description: None,
            scheduled_time: Some(scheduled_time),
            recurrence: None,
            active: true,
            last_delivered_at: None,
        }
    }

    #[test]
    fn one_shot_due_only_before_a_delivery_exists() {
        let store = store();
        let now = Utc::now();
        store.upsert_reminder(&one_shot_reminder("r1", now - chrono::Duration::minutes(1))).unwrap();
        assert_eq!(store.due_one_shot(now).unwrap().len(), 1);

        store.claim_delivery("r1", now - chrono::Duration::minutes(1)).unwrap();
        assert_eq!(store.due_one_shot(now).unwrap().len(), 0);
    }

    #[test]
    fn claiming_the_same_occurrence_twice_only_succeeds_once() {
        let store = store();
        let at = Utc.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap();
        let first = store.claim_delivery("r1", at).unwrap();
        let second = store.claim_delivery("r1", at).unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn failed_outcome_moves_to_retry_until_max_attempts() {
        let store = store();
        let at = Utc::now();
        let delivery = store.claim_delivery("r1", at).unwrap().unwrap();

        assert_eq!(store.mark_outcome(&delivery.id, false).unwrap(), DeliveryStatus::RetryPending);
        store.begin_retry_attempt(&delivery.id).unwrap();
        assert_eq!(store.mark_outcome(&delivery.id, false).unwrap(), DeliveryStatus::RetryPending);
        store.begin_retry_attempt(&delivery.id).unwrap();
        assert_eq!(store.mark_outcome(&delivery.id, false).unwrap(), DeliveryStatus::MaxAttempts);
    }

    #[test]
    fn acknowledging_a_terminal_delivery_twice_is_a_no_op() {
        let store = store();
        let delivery = store.claim_delivery("r1", Utc::now()).unwrap().unwrap();
        store.mark_outcome(&delivery.id, true).unwrap();

        assert!(store.mark_acknowledged(&delivery.id, DeliveryStatus::Acknowledged, None).unwrap());
        assert!(!store.mark_acknowledged(&delivery.id, DeliveryStatus::Confirmed, None).unwrap());
    }

    #[test]
    fn retry_pending_respects_the_delay_and_attempt_cap() {
        let store = store();
        let at = Utc::now() - chrono::Duration::minutes(45);
        let delivery = store.claim_delivery("r1", at).unwrap().unwrap();
        store.mark_outcome(&delivery.id, false).unwrap();

        let due = store.retry_pending(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
    }
}
