use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::types::{Session, SessionStatus};

/// Thread-safe manager for persisted user sessions.
///
/// Wraps a single SQLite connection in a `Mutex`. For high-concurrency
/// deployments consider a connection pool (e.g. r2d2), but a Mutex is
/// sufficient for the single-node Phase 2 target.
pub struct SessionManager {
    db: Mutex<Connection>,
}

impl SessionManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Return the active session for `session_key`, or create a new one if
    /// none exists (either never created, or the previous one was archived).
    ///
    /// Creating a session is cheap — no LLM call is made. The session is
    /// persisted so stats survive restarts.
    #[instrument(skip(self), fields(session_key))]
    pub fn get_or_create(&self, session_key: &str, user_id: &str) -> Result<Session> {
        // Fast path: an active session already exists
        if let Some(session) = self.active_for(session_key)? {
            debug!("session cache hit");
            return Ok(session);
        }

        // Slow path: create a new active row
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO sessions
             (id, session_key, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
            rusqlite::params![id, session_key, user_id, now],
        )?;

        // Read back — handles the race where two threads insert simultaneously
        let session = db.query_row(
            "SELECT id, session_key, user_id, title, status,
                    message_count, total_tokens, last_model, created_at, updated_at
             FROM sessions WHERE session_key = ?1 AND status = 'active'",
            rusqlite::params![session_key],
            row_to_session,
        )?;

        Ok(session)
    }

    /// Retrieve the *active* session for `session_key`, returning `None` if
    /// it does not exist or has been archived.
    #[instrument(skip(self), fields(session_key))]
    pub fn active_for(&self, session_key: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, session_key, user_id, title, status,
                    message_count, total_tokens, last_model, created_at, updated_at
             FROM sessions WHERE session_key = ?1 AND status = 'active'",
            rusqlite::params![session_key],
            row_to_session,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    /// Retrieve a session by key regardless of status. Kept as an alias of
    /// `active_for` for callers that only ever care about the live session.
    pub fn get(&self, session_key: &str) -> Result<Option<Session>> {
        self.active_for(session_key)
    }

    /// Archive the active session for `session_key`, if one exists. A
    /// subsequent `get_or_create` for the same key lazily starts a fresh
    /// session.
    #[instrument(skip(self), fields(session_key))]
    pub fn archive(&self, session_key: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions SET status = 'archived', updated_at = ?1
             WHERE session_key = ?2 AND status = 'active'",
            rusqlite::params![now, session_key],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound {
                key: session_key.to_string(),
            });
        }
        Ok(())
    }

    /// List the most-recently-updated sessions for a user, newest first.
    #[instrument(skip(self), fields(user_id, limit))]
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_key, user_id, title, status,
                    message_count, total_tokens, last_model, created_at, updated_at
             FROM sessions
             WHERE user_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Increment `message_count` by 1, add `tokens` to `total_tokens`,
    /// and record the model that was used.
    ///
    /// Also bumps `updated_at` so `list_for_user` ordering stays current.
    #[instrument(skip(self), fields(session_key, tokens, model))]
    pub fn update_stats(&self, session_key: &str, tokens: u64, model: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE sessions
             SET message_count = message_count + 1,
                 total_tokens  = total_tokens  + ?1,
                 last_model    = ?2,
                 updated_at    = ?3
             WHERE session_key = ?4 AND status = 'active'",
            rusqlite::params![tokens as i64, model, now, session_key],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound {
                key: session_key.to_string(),
            });
        }
        Ok(())
    }

    /// Permanently delete a session record.
    ///
    /// The associated conversation history in the `conversations` table is
    /// owned by `warden-memory` and must be cleaned up separately if needed.
    #[instrument(skip(self), fields(session_key))]
    pub fn delete(&self, session_key: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "DELETE FROM sessions WHERE session_key = ?1",
            rusqlite::params![session_key],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound {
                key: session_key.to_string(),
            });
        }
        Ok(())
    }
}

/// Map a SQLite row to a `Session`.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status_str: String = row.get(4)?;
    let status = status_str.parse().unwrap_or(SessionStatus::Active);

    Ok(Session {
        id: row.get(0)?,
        session_key: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        status,
        message_count: row.get::<_, i64>(5)? as u32,
        total_tokens: row.get::<_, i64>(6)? as u64,
        last_model: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> SessionManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        SessionManager::new(conn)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mgr = test_manager();
        let key = "user:u1:telegram:private_1";
        let first = mgr.get_or_create(key, "u1").unwrap();
        let second = mgr.get_or_create(key, "u1").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, SessionStatus::Active);
    }

    #[test]
    fn forget_archives_then_lazily_recreates() {
        let mgr = test_manager();
        let key = "user:u1:telegram:private_1";
        let original = mgr.get_or_create(key, "u1").unwrap();

        mgr.archive(key).unwrap();
        assert!(mgr.active_for(key).unwrap().is_none());

        let fresh = mgr.get_or_create(key, "u1").unwrap();
        assert_ne!(fresh.id, original.id);
        assert_eq!(fresh.status, SessionStatus::Active);
    }

    #[test]
    fn archive_without_active_session_is_not_found() {
        let mgr = test_manager();
        let result = mgr.archive("user:u1:telegram:private_1");
        assert!(matches!(result, Err(SessionError::NotFound { .. })));
    }

    #[test]
    fn update_stats_accumulates_on_active_session() {
        let mgr = test_manager();
        let key = "user:u1:telegram:private_1";
        mgr.get_or_create(key, "u1").unwrap();

        mgr.update_stats(key, 100, "claude-sonnet-4-6").unwrap();
        mgr.update_stats(key, 50, "claude-sonnet-4-6").unwrap();

        let session = mgr.active_for(key).unwrap().unwrap();
        assert_eq!(session.message_count, 2);
        assert_eq!(session.total_tokens, 150);
        assert_eq!(session.last_model.as_deref(), Some("claude-sonnet-4-6"));
    }

    #[test]
    fn list_for_user_orders_newest_first() {
        let mgr = test_manager();
        mgr.get_or_create("user:u1:telegram:private_1", "u1").unwrap();
        mgr.get_or_create("user:u1:cli:main", "u1").unwrap();

        let sessions = mgr.list_for_user("u1", 10).unwrap();
        assert_eq!(sessions.len(), 2);
    }
}
