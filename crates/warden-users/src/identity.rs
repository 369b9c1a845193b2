use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;
use warden_core::types::AccessLevel;

use crate::db::{row_to_user, USER_SELECT_SQL};
use crate::error::{Result, UserError};
use crate::types::{User, UserIdentity};

/// Insert a brand-new user row. Caller picks the access level; id is
/// generated here so the caller immediately has the canonical id.
pub fn create_user(conn: &Connection, display_name: &str, access_level: AccessLevel) -> Result<User> {
    let now = Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::now_v7().to_string(),
        name: display_name.to_string(),
        display_name: display_name.to_string(),
        access_level,
        aliases: Default::default(),
        preferences: Default::default(),
        total_messages: 0,
        first_seen_at: now.clone(),
        last_seen_at: now.clone(),
        created_at: now.clone(),
        updated_at: now,
    };
    insert_user_row(conn, &user)?;
    Ok(user)
}

/// Load a user by primary key. Returns None instead of an error when absent
/// so callers decide whether missing is exceptional in their context.
pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(USER_SELECT_SQL)?;
    match stmt.query_row(params![user_id], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// True when no user rows exist yet — used to auto-promote the first
/// registered user to owner.
pub fn is_first_user(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count == 0)
}

/// Persist all mutable fields of an existing user. Always bumps updated_at.
pub fn update_user(conn: &Connection, user: &User) -> Result<()> {
    let aliases_json = serde_json::to_string(&user.aliases)?;
    let preferences_json = serde_json::to_string(&user.preferences)?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users SET
            name=?2, display_name=?3, access_level=?4, aliases=?5, preferences=?6,
            total_messages=?7, last_seen_at=?8, updated_at=?9
         WHERE id=?1",
        params![
            user.id,
            user.name,
            user.display_name,
            user.access_level.to_string(),
            aliases_json,
            preferences_json,
            user.total_messages,
            user.last_seen_at,
            now,
        ],
    )?;
    Ok(())
}

/// Register a new channel identity for an existing user. The UNIQUE
/// constraint on (channel, identifier) prevents duplicate links at the DB
/// level.
pub fn add_identity(
    conn: &Connection,
    user_id: &str,
    channel: &str,
    identifier: &str,
) -> Result<UserIdentity> {
    let now = Utc::now().to_rfc3339();
    let identity = UserIdentity {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        channel: channel.to_string(),
        identifier: identifier.to_string(),
        verified: false,
        linked_by: None,
        linked_at: now.clone(),
        created_at: now,
    };
    conn.execute(
        "INSERT INTO user_identities
            (id, user_id, channel, identifier, verified, linked_by, linked_at, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            identity.id,
            identity.user_id,
            identity.channel,
            identity.identifier,
            identity.verified as i32,
            identity.linked_by,
            identity.linked_at,
            identity.created_at,
        ],
    )?;
    Ok(identity)
}

/// Cross-channel lookup: given a channel + external identifier, return the
/// owning user. Hot path: called on every inbound message.
pub fn find_user_by_identity(
    conn: &Connection,
    channel: &str,
    identifier: &str,
) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.display_name, u.access_level, u.aliases, u.preferences,
                u.total_messages, u.first_seen_at, u.last_seen_at, u.created_at, u.updated_at
         FROM users u
         JOIN user_identities i ON i.user_id = u.id
         WHERE i.channel = ?1 AND i.identifier = ?2",
    )?;
    match stmt.query_row(params![channel, identifier], row_to_user) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(UserError::DatabaseError(e)),
    }
}

/// Return all identities linked to a given Warden user, for prompt injection.
pub fn list_identities_for_user(conn: &Connection, user_id: &str) -> Result<Vec<UserIdentity>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, channel, identifier, verified, linked_by, linked_at, created_at
         FROM user_identities WHERE user_id = ?1
         ORDER BY created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(UserIdentity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                channel: row.get(2)?,
                identifier: row.get(3)?,
                verified: row.get::<_, i32>(4)? != 0,
                linked_by: row.get(5)?,
                linked_at: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_user_row(conn: &Connection, user: &User) -> Result<()> {
    let aliases_json = serde_json::to_string(&user.aliases)?;
    let preferences_json = serde_json::to_string(&user.preferences)?;
    conn.execute(
        "INSERT INTO users (
            id, name, display_name, access_level, aliases, preferences,
            total_messages, first_seen_at, last_seen_at, created_at, updated_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            user.id,
            user.name,
            user.display_name,
            user.access_level.to_string(),
            aliases_json,
            preferences_json,
            user.total_messages,
            user.first_seen_at,
            user.last_seen_at,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}
