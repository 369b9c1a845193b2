use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle state of a session.
///
/// Exactly one session per `session_key` may be `Active` at a time.
/// `/forget` archives the active row; the next message lazily creates a
/// fresh active one under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = crate::error::SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "archived" => Ok(SessionStatus::Archived),
            other => Err(crate::error::SessionError::InvalidKey(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// A persisted conversation session.
///
/// Identity is `(platform, platform_chat_id)`, folded into the single
/// `session_key` string every channel adapter already builds (e.g.
/// `user:{uid}:telegram:private_{chat_id}`) — this crate treats it as an
/// opaque key, it doesn't parse or construct it.
///
/// Sessions are lazy-created on first message and track aggregate stats so
/// `/status` can show token usage without scanning the full conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// UUIDv7 primary key — time-sortable.
    pub id: String,
    /// The opaque channel-scoped key that identifies this session.
    pub session_key: String,
    /// Warden user ID that owns this session.
    pub user_id: String,
    /// Optional user-provided title (e.g. "Weekend trip planning").
    pub title: Option<String>,
    /// Active or archived. See `SessionStatus`.
    pub status: SessionStatus,
    /// Total number of messages exchanged in this session.
    pub message_count: u32,
    /// Cumulative token usage across all messages.
    pub total_tokens: u64,
    /// The model used for the most recent message (may change over time).
    pub last_model: Option<String>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}
