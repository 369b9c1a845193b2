use rusqlite::{Connection, Result};
use warden_core::types::AccessLevel;

use crate::types::User;

/// Map a SELECT row (column order from `USER_SELECT_SQL`) to a User.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    use std::str::FromStr;
    let aliases: std::collections::HashMap<String, String> =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    let preferences: std::collections::HashMap<String, String> =
        serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    let access_level = AccessLevel::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        access_level,
        aliases,
        preferences,
        total_messages: row.get(6)?,
        first_seen_at: row.get(7)?,
        last_seen_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) const USER_SELECT_SQL: &str =
    "SELECT id, name, display_name, access_level, aliases, preferences,
            total_messages, first_seen_at, last_seen_at, created_at, updated_at
     FROM users WHERE id = ?1";

/// Initialise all tables for the users subsystem. Safe to call on every
/// startup, `CREATE TABLE IF NOT EXISTS` keeps it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_identities_table(conn)?;
    create_groups_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY NOT NULL,
            name            TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            access_level    TEXT NOT NULL DEFAULT 'public',
            aliases         TEXT NOT NULL DEFAULT '{}',
            preferences     TEXT NOT NULL DEFAULT '{}',
            total_messages  INTEGER NOT NULL DEFAULT 0,
            first_seen_at   TEXT NOT NULL,
            last_seen_at    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_identities_table(conn: &Connection) -> Result<()> {
    // UNIQUE(channel, identifier) enforces one user per external account.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_identities (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(id),
            channel     TEXT NOT NULL,
            identifier  TEXT NOT NULL,
            verified    INTEGER NOT NULL DEFAULT 0,
            linked_by   TEXT,
            linked_at   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(channel, identifier)
        );
        CREATE INDEX IF NOT EXISTS idx_identities_lookup
            ON user_identities (channel, identifier);",
    )
}

fn create_groups_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS groups (
            id                  TEXT PRIMARY KEY NOT NULL,
            platform            TEXT NOT NULL,
            platform_group_id   TEXT NOT NULL,
            enabled             INTEGER NOT NULL DEFAULT 1,
            require_mention     INTEGER NOT NULL DEFAULT 0,
            allow_from          TEXT NOT NULL DEFAULT 'registered',
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE(platform, platform_group_id)
        );",
    )
}
