use rusqlite::{Connection, Result};

/// Initialise memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_memories_table(conn)
}

fn create_memories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id                TEXT PRIMARY KEY,
            tenant_id         TEXT NOT NULL,
            memory_type       TEXT NOT NULL,
            content           TEXT NOT NULL,
            embedding         TEXT NOT NULL,
            importance        INTEGER NOT NULL DEFAULT 50,
            source            TEXT NOT NULL,
            last_accessed_at  TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_tenant
            ON memories(tenant_id);
        CREATE INDEX IF NOT EXISTS idx_memories_tenant_type
            ON memories(tenant_id, memory_type);",
    )
}
