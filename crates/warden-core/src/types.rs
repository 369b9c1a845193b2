use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a user (UUIDv7 — time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies which agent instance handles a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The default single-agent setup uses "main".
    pub fn main() -> Self {
        Self("main".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// User-centric session key.
///
/// Sessions belong to users, not channels: the same user on Telegram and on
/// the CLI resolves to the same session key.
/// Format: `user:{user_id}:agent:{agent_id}:{session_name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn for_user(user_id: &UserId, agent_id: &AgentId, session: &str) -> Self {
        Self(format!("user:{}:agent:{}:{}", user_id, agent_id, session))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a sub-agent run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message bound for delivery on a channel other than the one it was
/// produced on — e.g. the agent decides mid-conversation to ping the user's
/// Telegram DM instead of replying on the channel it was invoked from.
///
/// Sent over a per-channel-adapter `mpsc` queue keyed by channel name —
/// the channel itself is implicit in which queue carried the message, so
/// it isn't repeated on the struct. `recipient` is interpreted by the
/// receiving adapter (a Telegram chat ID, a CLI session key, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOutbound {
    pub recipient: String,
    pub message: String,
}

/// Access-level hierarchy: five totally ordered tiers.
///
/// Variant order matters — derived `PartialOrd`/`Ord` compare tiers by
/// declaration order, so `AccessLevel::Public < AccessLevel::Owner` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Public,
    Friend,
    Family,
    Admin,
    Owner,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 5] = [
        AccessLevel::Public,
        AccessLevel::Friend,
        AccessLevel::Family,
        AccessLevel::Admin,
        AccessLevel::Owner,
    ];

    pub fn is_owner(&self) -> bool {
        matches!(self, AccessLevel::Owner)
    }

    pub fn is_owner_or_admin(&self) -> bool {
        matches!(self, AccessLevel::Owner | AccessLevel::Admin)
    }

    /// Index into the totally-ordered tier list (public=0 .. owner=4).
    pub fn index(&self) -> usize {
        match self {
            AccessLevel::Public => 0,
            AccessLevel::Friend => 1,
            AccessLevel::Family => 2,
            AccessLevel::Admin => 3,
            AccessLevel::Owner => 4,
        }
    }

    /// Effective level for tool exposure: the user's nominal level in a DM,
    /// capped to `Public` in a group chat.
    pub fn effective(&self, is_group: bool) -> AccessLevel {
        if is_group {
            AccessLevel::Public
        } else {
            *self
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::Public => "public",
            AccessLevel::Friend => "friend",
            AccessLevel::Family => "family",
            AccessLevel::Admin => "admin",
            AccessLevel::Owner => "owner",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessLevel::Public),
            "friend" => Ok(AccessLevel::Friend),
            "family" => Ok(AccessLevel::Family),
            "admin" => Ok(AccessLevel::Admin),
            "owner" => Ok(AccessLevel::Owner),
            other => Err(format!("unknown access level: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::Public < AccessLevel::Friend);
        assert!(AccessLevel::Family < AccessLevel::Admin);
        assert!(AccessLevel::Admin < AccessLevel::Owner);
    }

    #[test]
    fn effective_caps_to_public_in_group() {
        assert_eq!(AccessLevel::Owner.effective(true), AccessLevel::Public);
        assert_eq!(AccessLevel::Owner.effective(false), AccessLevel::Owner);
    }

    #[test]
    fn roundtrip_display_parse() {
        for lvl in AccessLevel::ALL {
            let parsed: AccessLevel = lvl.to_string().parse().unwrap();
            assert_eq!(parsed, lvl);
        }
    }
}
