use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `reminders` and `deliveries` tables (§3 data model).
///
/// The unique index on `(reminder_id, scheduled_for)` is the persistence-level
/// half of the advisory-lock pattern (§4.12, §5): even if two scheduler
/// instances both decide a reminder is due for the same occurrence, only one
/// `INSERT` survives.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id                TEXT    NOT NULL PRIMARY KEY,
            tenant_id         TEXT    NOT NULL,
            reminder_type     TEXT    NOT NULL,
            title             TEXT    NOT NULL,
            description       TEXT,
            scheduled_time    TEXT,              -- ISO-8601, one-shot only
            recurrence        TEXT,              -- e.g. 'daily 09:00', recurring only
            active            INTEGER NOT NULL DEFAULT 1,
            last_delivered_at TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_reminders_due
            ON reminders (tenant_id, active, scheduled_time);

        CREATE TABLE IF NOT EXISTS deliveries (
            id              TEXT    NOT NULL PRIMARY KEY,
            reminder_id     TEXT    NOT NULL,
            scheduled_for   TEXT    NOT NULL,
            delivered_at    TEXT,
            acknowledged_at TEXT,
            status          TEXT    NOT NULL DEFAULT 'pending',
            attempt_count   INTEGER NOT NULL DEFAULT 0,
            call_sid        TEXT,
            user_response   TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_deliveries_status
            ON deliveries (status, scheduled_for);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_deliveries_unique_occurrence
            ON deliveries (reminder_id, scheduled_for);
        ",
    )?;
    Ok(())
}
