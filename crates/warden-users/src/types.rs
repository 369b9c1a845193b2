use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use warden_core::types::AccessLevel;

/// Full user record. Stored in SQLite; loaded into memory only when active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUIDv7 — time-sortable, useful for log correlation across channels.
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub access_level: AccessLevel,

    /// Default display name plus per-group overrides, keyed by group id.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Free-form preference bag (language, tone, timezone, ...).
    #[serde(default)]
    pub preferences: HashMap<String, String>,

    pub total_messages: u64,

    pub first_seen_at: String,
    pub last_seen_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Maps an external channel identity (e.g. Telegram user_id) to a Warden user.
///
/// One user can have many identities across channels, enabling cross-channel
/// memory and session continuity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub user_id: String,
    /// Channel name, e.g. "telegram", "cli".
    pub channel: String,
    /// Opaque identifier within that channel (e.g. Telegram numeric user id).
    pub identifier: String,
    pub verified: bool,
    pub linked_by: Option<String>,
    pub linked_at: String,
    pub created_at: String,
}

/// A group chat the bot participates in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub platform: String,
    pub platform_group_id: String,
    pub enabled: bool,
    pub require_mention: bool,
    pub allow_from: GroupAllowFrom,
    pub created_at: String,
    pub updated_at: String,
}

/// Per-group gate on who may trigger the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupAllowFrom {
    All,
    Registered,
}

impl std::fmt::Display for GroupAllowFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupAllowFrom::All => write!(f, "all"),
            GroupAllowFrom::Registered => write!(f, "registered"),
        }
    }
}

impl std::str::FromStr for GroupAllowFrom {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(GroupAllowFrom::All),
            "registered" => Ok(GroupAllowFrom::Registered),
            other => Err(format!("unknown allow_from: {}", other)),
        }
    }
}
