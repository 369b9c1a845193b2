use rusqlite::{Connection, Result};

/// Initialise memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_user_memory_table(conn)?;
    create_conversations_table(conn)?;
    Ok(())
}

fn create_user_memory_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_memory (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            category    TEXT NOT NULL,
            content     TEXT NOT NULL,
            embedding   TEXT NOT NULL,
            importance  REAL NOT NULL DEFAULT 0.5,
            permanent   INTEGER NOT NULL DEFAULT 0,
            source      TEXT NOT NULL DEFAULT 'inferred',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_user
            ON user_memory(user_id);
        CREATE INDEX IF NOT EXISTS idx_memory_user_category
            ON user_memory(user_id, category);",
    )
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT,
            session_key TEXT NOT NULL,
            channel     TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'message',
            metadata    TEXT,
            model_used  TEXT,
            tokens_in   INTEGER NOT NULL DEFAULT 0,
            tokens_out  INTEGER NOT NULL DEFAULT 0,
            cost_usd    REAL NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conv_user
            ON conversations(user_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_conv_session
            ON conversations(session_key, created_at);",
    )
}
