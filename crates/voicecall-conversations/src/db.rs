use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `conversations` and `call_analyses` tables (§3 data model).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id               TEXT NOT NULL PRIMARY KEY,
            tenant_id        TEXT NOT NULL,
            call_sid         TEXT NOT NULL,
            started_at       TEXT NOT NULL,
            ended_at         TEXT,
            duration_seconds INTEGER,
            status           TEXT NOT NULL DEFAULT 'in_progress',
            transcript       TEXT NOT NULL DEFAULT '[]',
            summary          TEXT,
            sentiment        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_tenant
            ON conversations(tenant_id, started_at DESC);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_call_sid
            ON conversations(call_sid);

        CREATE TABLE IF NOT EXISTS call_analyses (
            conversation_id         TEXT NOT NULL PRIMARY KEY,
            tenant_id               TEXT NOT NULL,
            summary                 TEXT NOT NULL,
            topics                  TEXT NOT NULL DEFAULT '[]',
            engagement_score        INTEGER NOT NULL,
            concerns                TEXT NOT NULL DEFAULT '[]',
            positive_observations   TEXT NOT NULL DEFAULT '[]',
            follow_up_suggestions   TEXT NOT NULL DEFAULT '[]',
            call_quality            TEXT NOT NULL
        );",
    )?;
    Ok(())
}
