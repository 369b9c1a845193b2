use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::debug;
use warden_core::types::AccessLevel;
use warden_users::access::memory_visible;

use crate::error::MemoryError;
use crate::types::*;

/// Maximum rendered context size in characters (~1500 tokens).
const MAX_CONTEXT_CHARS: usize = 6000;
/// Cache entries expire after 5 minutes.
const CACHE_TTL_SECS: i64 = 300;
/// Maximum cache entries before eviction.
const MAX_CACHE_ENTRIES: usize = 256;
/// Near-duplicate threshold for `store_if_new`. Above this cosine similarity
/// an existing memory is updated in place rather than a new row inserted.
const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.93;

/// Manages per-user memory and conversation history.
///
/// Thread-safe: wraps SQLite connection in Mutex and keeps an in-memory
/// cache of rendered UserContext to avoid rebuilding on every message.
///
/// Embeddings are supplied by the caller rather than computed here — the
/// embedding backend lives in the agent/provider layer, which depends on
/// this crate rather than the other way around.
pub struct MemoryManager {
    db: Mutex<Connection>,
    cache: Mutex<HashMap<String, UserContext>>,
}

impl MemoryManager {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Store a new memory fact unconditionally.
    pub fn store(
        &self,
        user_id: &str,
        category: MemoryCategory,
        content: &str,
        embedding: &[f32],
        importance: f64,
        permanent: bool,
        source: MemorySource,
    ) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let id = insert_memory(&db, user_id, category, content, embedding, importance, permanent, source)?;
        drop(db);
        self.invalidate_cache(user_id);
        Ok(id)
    }

    /// Store a memory, first checking for a near-duplicate. If one is found
    /// (cosine similarity above threshold, same user and category), its
    /// content/importance/timestamp are updated in place and no new row is
    /// inserted. Returns `None` when the candidate was folded into an
    /// existing row that needed no change.
    pub fn store_if_new(
        &self,
        user_id: &str,
        category: MemoryCategory,
        content: &str,
        embedding: &[f32],
        importance: f64,
        permanent: bool,
        source: MemorySource,
    ) -> Result<Option<i64>, MemoryError> {
        let db = self.db.lock().unwrap();
        let candidates = load_user_category_memories(&db, user_id, category)?;

        let best = candidates
            .iter()
            .map(|(mem, vec)| (mem, cosine_similarity(embedding, vec)))
            .filter(|(_, sim)| *sim >= DEDUP_SIMILARITY_THRESHOLD)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((existing, sim)) = best {
            debug!(user_id, id = existing.id, sim, "folding near-duplicate memory");
            let now = chrono::Utc::now().to_rfc3339();
            db.execute(
                "UPDATE user_memory SET content = ?1, embedding = ?2, importance = ?3,
                 permanent = ?4, updated_at = ?5 WHERE id = ?6",
                rusqlite::params![
                    content,
                    embedding_to_json(embedding),
                    importance,
                    permanent as i64,
                    now,
                    existing.id
                ],
            )?;
            drop(db);
            self.invalidate_cache(user_id);
            return Ok(None);
        }

        let id = insert_memory(&db, user_id, category, content, embedding, importance, permanent, source)?;
        drop(db);
        self.invalidate_cache(user_id);
        Ok(Some(id))
    }

    /// Delete a specific memory by id ("forget that I'm vegetarian").
    pub fn forget(&self, user_id: &str, memory_id: i64) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "DELETE FROM user_memory WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![memory_id, user_id],
        )?;
        if rows == 0 {
            return Err(MemoryError::NotFound {
                category: String::new(),
                key: memory_id.to_string(),
            });
        }
        self.invalidate_cache(user_id);
        Ok(())
    }

    /// Embed the query (caller-supplied vector), return the top-k memories
    /// by cosine similarity across all users, then apply Rule 760: strip
    /// cross-user private-category memories unless the requester is
    /// owner/admin.
    pub fn recall(
        &self,
        query_embedding: &[f32],
        limit: usize,
        requester_id: &str,
        requester_level: AccessLevel,
    ) -> Result<Vec<UserMemory>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, category, content, embedding, importance,
                    permanent, source, created_at, updated_at
             FROM user_memory",
        )?;
        let all: Vec<(UserMemory, Vec<f32>)> = stmt
            .query_map([], row_to_memory_with_vec)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(db);

        let mut scored: Vec<(f64, UserMemory)> = all
            .into_iter()
            .filter(|(mem, _)| {
                memory_visible(&mem.category.to_string(), &mem.user_id, requester_id, requester_level)
            })
            .map(|(mem, vec)| (cosine_similarity(query_embedding, &vec), mem))
            .collect();

        scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, mem)| mem).collect())
    }

    /// Load all memories for a user and render into a prompt section.
    /// Results are cached for 5 minutes to avoid repeated DB hits.
    pub fn build_user_context(&self, user_id: &str) -> Result<UserContext, MemoryError> {
        if let Some(cached) = self.get_cached(user_id) {
            return Ok(cached);
        }

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, category, content, embedding, importance,
                    permanent, source, created_at, updated_at
             FROM user_memory
             WHERE user_id = ?1
             ORDER BY importance DESC",
        )?;
        let memories: Vec<UserMemory> = stmt
            .query_map(rusqlite::params![user_id], row_to_memory)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(db);

        let rendered = render_context(&memories);
        let ctx = UserContext {
            user_id: user_id.to_string(),
            rendered,
            memory_count: memories.len(),
            built_at: chrono::Utc::now(),
        };

        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= MAX_CACHE_ENTRIES {
            let oldest_key = cache
                .iter()
                .min_by_key(|(_, v)| v.built_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest_key {
                cache.remove(&k);
            }
        }
        cache.insert(user_id.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Store a conversation message for history and cost tracking.
    pub fn save_message(&self, msg: &ConversationMessage) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversations
             (user_id, session_key, channel, role, content, kind, metadata,
              model_used, tokens_in, tokens_out, cost_usd, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                msg.user_id,
                msg.session_key,
                msg.channel,
                msg.role,
                msg.content,
                msg.kind.to_string(),
                msg.metadata,
                msg.model_used,
                msg.tokens_in,
                msg.tokens_out,
                msg.cost_usd,
                msg.created_at,
            ],
        )?;
        Ok(())
    }

    /// Retrieve recent conversation history for a session, oldest first.
    pub fn get_history(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, session_key, channel, role, content, kind,
                    metadata, model_used, tokens_in, tokens_out, cost_usd, created_at
             FROM conversations
             WHERE session_key = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_key, limit], row_to_message)?;
        let mut msgs: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        msgs.reverse();
        Ok(msgs)
    }

    /// Number of turns currently stored for a session. Drives the compactor's
    /// threshold check.
    pub fn count_turns(&self, session_key: &str) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM conversations WHERE session_key = ?1",
            rusqlite::params![session_key],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The oldest `limit` turns for a session, oldest first. Used by the
    /// compactor to pick the batch to summarize.
    pub fn get_oldest_turns(
        &self,
        session_key: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, session_key, channel, role, content, kind,
                    metadata, model_used, tokens_in, tokens_out, cost_usd, created_at
             FROM conversations
             WHERE session_key = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![session_key, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Delete turns by id (used after compaction, and by `/clear`). Returns
    /// the number of rows actually removed.
    pub fn delete_turns(&self, ids: &[i64]) -> Result<usize, MemoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let db = self.db.lock().unwrap();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = db.execute(
            &format!("DELETE FROM conversations WHERE id IN ({placeholders})"),
            params.as_slice(),
        )?;
        Ok(rows)
    }

    /// Replace the span `[start_id, end_id]` in `session_key`'s history with
    /// a single compaction-summary system message, inserted at the earliest
    /// timestamp in the span. Used by the compactor; idempotent in the sense
    /// that calling it twice on an already-replaced span is a no-op because
    /// the span will no longer match any rows.
    pub fn replace_with_summary(
        &self,
        session_key: &str,
        span_ids: &[i64],
        summary: &str,
    ) -> Result<(), MemoryError> {
        if span_ids.is_empty() {
            return Ok(());
        }
        let db = self.db.lock().unwrap();
        let placeholders = span_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let params: Vec<&dyn rusqlite::ToSql> = span_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        let earliest: String = db.query_row(
            &format!("SELECT MIN(created_at) FROM conversations WHERE id IN ({placeholders})"),
            params.as_slice(),
            |row| row.get(0),
        )?;

        db.execute(
            &format!("DELETE FROM conversations WHERE id IN ({placeholders})"),
            params.as_slice(),
        )?;

        db.execute(
            "INSERT INTO conversations
             (user_id, session_key, channel, role, content, kind, created_at)
             VALUES (NULL, ?1, 'system', 'system', ?2, 'compaction_summary', ?3)",
            rusqlite::params![session_key, summary, earliest],
        )?;
        Ok(())
    }

    fn get_cached(&self, user_id: &str) -> Option<UserContext> {
        let cache = self.cache.lock().unwrap();
        let ctx = cache.get(user_id)?;
        let age = chrono::Utc::now()
            .signed_duration_since(ctx.built_at)
            .num_seconds();
        if age < CACHE_TTL_SECS {
            Some(ctx.clone())
        } else {
            None
        }
    }

    fn invalidate_cache(&self, user_id: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(user_id);
    }
}

fn insert_memory(
    db: &Connection,
    user_id: &str,
    category: MemoryCategory,
    content: &str,
    embedding: &[f32],
    importance: f64,
    permanent: bool,
    source: MemorySource,
) -> Result<i64, MemoryError> {
    let now = chrono::Utc::now().to_rfc3339();
    db.execute(
        "INSERT INTO user_memory
         (user_id, category, content, embedding, importance, permanent, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            user_id,
            category.to_string(),
            content,
            embedding_to_json(embedding),
            importance,
            permanent as i64,
            source.to_string(),
            now,
        ],
    )?;
    Ok(db.last_insert_rowid())
}

fn load_user_category_memories(
    db: &Connection,
    user_id: &str,
    category: MemoryCategory,
) -> Result<Vec<(UserMemory, Vec<f32>)>, MemoryError> {
    let mut stmt = db.prepare(
        "SELECT id, user_id, category, content, embedding, importance,
                permanent, source, created_at, updated_at
         FROM user_memory WHERE user_id = ?1 AND category = ?2",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![user_id, category.to_string()],
        row_to_memory_with_vec,
    )?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched
/// dimensions or zero-magnitude vectors rather than panicking.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn embedding_to_json(embedding: &[f32]) -> String {
    serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string())
}

fn embedding_from_json(s: &str) -> Vec<f32> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Render memories into a text block for prompt injection, highest
/// importance first, truncated to `MAX_CONTEXT_CHARS`.
fn render_context(memories: &[UserMemory]) -> String {
    let mut out = String::with_capacity(MAX_CONTEXT_CHARS);
    let mut current_cat = String::new();

    for mem in memories {
        let cat = mem.category.to_string();
        if cat != current_cat {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## {}\n", capitalize(&cat)));
            current_cat = cat;
        }
        let line = format!("- {}\n", mem.content);
        if out.len() + line.len() > MAX_CONTEXT_CHARS {
            break;
        }
        out.push_str(&line);
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserMemory> {
    let cat_str: String = row.get(2)?;
    let src_str: String = row.get(7)?;
    Ok(UserMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: cat_str.parse().unwrap_or(MemoryCategory::Fact),
        content: row.get(3)?,
        importance: row.get(5)?,
        permanent: row.get::<_, i64>(6)? != 0,
        source: src_str.parse().unwrap_or(MemorySource::Inferred),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_memory_with_vec(row: &rusqlite::Row<'_>) -> rusqlite::Result<(UserMemory, Vec<f32>)> {
    let mem = row_to_memory(row)?;
    let embedding_json: String = row.get(4)?;
    Ok((mem, embedding_from_json(&embedding_json)))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessage> {
    let kind_str: String = row.get(6)?;
    Ok(ConversationMessage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_key: row.get(2)?,
        channel: row.get(3)?,
        role: row.get(4)?,
        content: row.get(5)?,
        kind: kind_str.parse().unwrap_or(MessageKind::Message),
        metadata: row.get(7)?,
        model_used: row.get(8)?,
        tokens_in: row.get(9)?,
        tokens_out: row.get(10)?,
        cost_usd: row.get(11)?,
        created_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> MemoryManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        MemoryManager::new(conn)
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
    }

    #[test]
    fn store_if_new_folds_near_duplicate() {
        let mgr = test_manager();
        let v = vec![0.1_f32; 8];
        let id1 = mgr
            .store_if_new("u1", MemoryCategory::Fact, "lives in Jakarta", &v, 0.7, false, MemorySource::UserConfirmed)
            .unwrap();
        assert!(id1.is_some());

        let id2 = mgr
            .store_if_new("u1", MemoryCategory::Fact, "lives in Bandung now", &v, 0.7, false, MemorySource::UserConfirmed)
            .unwrap();
        assert!(id2.is_none());

        let ctx = mgr.build_user_context("u1").unwrap();
        assert_eq!(ctx.memory_count, 1);
        assert!(ctx.rendered.contains("Bandung"));
    }

    #[test]
    fn recall_filters_private_category_for_other_user() {
        let mgr = test_manager();
        let v = vec![0.2_f32; 8];
        mgr.store("alice", MemoryCategory::Health, "takes metformin", &v, 0.8, false, MemorySource::UserConfirmed)
            .unwrap();

        let as_bob = mgr.recall(&v, 10, "bob", AccessLevel::Friend).unwrap();
        assert!(as_bob.is_empty());

        let as_alice = mgr.recall(&v, 10, "alice", AccessLevel::Public).unwrap();
        assert_eq!(as_alice.len(), 1);

        let as_admin = mgr.recall(&v, 10, "bob", AccessLevel::Admin).unwrap();
        assert_eq!(as_admin.len(), 1);
    }

    #[test]
    fn recall_orders_by_similarity() {
        let mgr = test_manager();
        mgr.store("u1", MemoryCategory::Fact, "close match", &[1.0, 0.0], 0.5, false, MemorySource::Inferred)
            .unwrap();
        mgr.store("u1", MemoryCategory::Fact, "far match", &[0.0, 1.0], 0.5, false, MemorySource::Inferred)
            .unwrap();

        let results = mgr.recall(&[0.9, 0.1], 10, "u1", AccessLevel::Public).unwrap();
        assert_eq!(results[0].content, "close match");
    }
}
