use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};
use warden_core::types::AccessLevel;

use crate::error::{Result, UserError};
use crate::identity::{add_identity, create_user, find_user_by_identity, is_first_user};
use crate::types::User;

/// Maximum number of (channel, identifier) -> user_id pairs kept in the
/// in-process cache. Simple eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 256;

/// Result of resolving a (channel, identifier) pair.
#[derive(Debug)]
pub enum ResolvedUser {
    Known(User),
    /// Auto-created on first contact. Caller should trigger onboarding flow.
    NewlyCreated { user: User, needs_onboarding: bool },
}

impl ResolvedUser {
    pub fn user(&self) -> &User {
        match self {
            ResolvedUser::Known(u) => u,
            ResolvedUser::NewlyCreated { user, .. } => user,
        }
    }
}

/// Translates external channel identities into first-class Warden users.
///
/// Hot path: every inbound message calls `resolve()`. The (channel,
/// identifier) -> user_id mapping is cached in memory to avoid a DB
/// round-trip on every message for known users.
pub struct UserResolver {
    db: Arc<Mutex<Connection>>,
    cache: Mutex<HashMap<(String, String), String>>,
    cache_order: Mutex<Vec<(String, String)>>,
}

impl UserResolver {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a (channel, identifier) pair to a user.
    ///
    /// On first contact, the user is auto-created. If this is the very
    /// first user ever registered in the system they are promoted to
    /// `Owner`; otherwise they start at `Public`.
    pub fn resolve(&self, channel: &str, identifier: &str) -> Result<ResolvedUser> {
        let key = (channel.to_string(), identifier.to_string());

        if let Some(user_id) = self.cache_lookup(&key) {
            debug!(channel, identifier, user_id, "cache hit");
            let conn = self.db.lock().unwrap();
            if let Some(user) = crate::identity::get_user(&conn, &user_id)? {
                return Ok(ResolvedUser::Known(user));
            }
            self.cache_remove(&key);
        }

        let conn = self.db.lock().unwrap();
        if let Some(user) = find_user_by_identity(&conn, channel, identifier)? {
            self.cache_insert(key, user.id.clone());
            return Ok(ResolvedUser::Known(user));
        }

        let access_level = if is_first_user(&conn)? {
            info!(channel, identifier, "first user — promoting to owner");
            AccessLevel::Owner
        } else {
            AccessLevel::Public
        };

        let display_name = format!("{}:{}", channel, identifier);
        let user = create_user(&conn, &display_name, access_level)?;
        add_identity(&conn, &user.id, channel, identifier)?;
        self.cache_insert(key, user.id.clone());

        Ok(ResolvedUser::NewlyCreated {
            user,
            needs_onboarding: true,
        })
    }

    /// Re-assign an existing channel identity to a different (target) user.
    /// Used when an owner/admin manually links two accounts.
    pub fn link_identity(
        &self,
        caller_id: &str,
        channel: &str,
        identifier: &str,
        target_user_id: &str,
    ) -> Result<()> {
        let conn = self.db.lock().unwrap();

        let caller = crate::identity::get_user(&conn, caller_id)?
            .ok_or_else(|| UserError::NotFound(caller_id.to_string()))?;
        if !caller.access_level.is_owner_or_admin() {
            return Err(UserError::PermissionDenied(
                "only admin/owner may re-link identities".to_string(),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE user_identities
             SET user_id=?3, linked_by=?4, linked_at=?5
             WHERE channel=?1 AND identifier=?2",
            rusqlite::params![channel, identifier, target_user_id, caller_id, now],
        )?;

        if rows == 0 {
            add_identity(&conn, target_user_id, channel, identifier)?;
        }

        self.invalidate_channel(channel, identifier);
        Ok(())
    }

    /// Re-assign a channel identity to `target_user_id` without an
    /// owner/admin caller — used by the self-service verification-code flow,
    /// where possession of the code (delivered out-of-band to the other
    /// channel) is itself the proof of ownership.
    pub fn self_link(&self, channel: &str, identifier: &str, target_user_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();

        let now = chrono::Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE user_identities
             SET user_id=?3, linked_by=?3, linked_at=?4
             WHERE channel=?1 AND identifier=?2",
            rusqlite::params![channel, identifier, target_user_id, now],
        )?;

        if rows == 0 {
            add_identity(&conn, target_user_id, channel, identifier)?;
        }

        drop(conn);
        self.invalidate_channel(channel, identifier);
        Ok(())
    }

    /// Remove a channel identity from `user_id`. Callers must verify
    /// ownership and that at least one identity remains before calling this.
    pub fn remove_identity(&self, user_id: &str, channel: &str, identifier: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "DELETE FROM user_identities WHERE user_id=?1 AND channel=?2 AND identifier=?3",
            rusqlite::params![user_id, channel, identifier],
        )?;
        drop(conn);
        self.invalidate_channel(channel, identifier);
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.db.lock().unwrap();
        crate::identity::get_user(&conn, user_id)
    }

    pub fn list_identities(&self, user_id: &str) -> Result<Vec<crate::types::UserIdentity>> {
        let conn = self.db.lock().unwrap();
        crate::identity::list_identities_for_user(&conn, user_id)
    }

    pub fn invalidate_user(&self, user_id: &str) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        order.retain(|k| {
            if cache.get(k).map(|v| v.as_str()) == Some(user_id) {
                cache.remove(k);
                false
            } else {
                true
            }
        });
    }

    fn cache_lookup(&self, key: &(String, String)) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn cache_remove(&self, key: &(String, String)) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(key);
        order.retain(|k| k != key);
    }

    fn cache_insert(&self, key: (String, String), user_id: String) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if let std::collections::hash_map::Entry::Occupied(mut e) = cache.entry(key.clone()) {
            e.insert(user_id);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key.clone());
        cache.insert(key, user_id);
    }

    fn invalidate_channel(&self, channel: &str, identifier: &str) {
        let key = (channel.to_string(), identifier.to_string());
        self.cache_remove(&key);
    }
}
