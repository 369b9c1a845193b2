//! Reminder delivery types — shared between the scheduler engine and all
//! channel adapters.

use serde::{Deserialize, Serialize};

/// Stored as a JSON string in the `scheduled_tasks.payload` column when the
/// task is a user-facing reminder (as opposed to an opaque agent task run
/// through the sub-agent manager).
///
/// Created by the reminder tool when the user asks to be reminded of
/// something; parsed by the scheduler's delivery step when the job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderAction {
    /// Text to deliver as the synthetic user turn.
    pub message: String,
    /// Session key identifying which live conversation should receive this
    /// delivery. Required — the scheduler has no notion of "broadcast".
    pub session_key: String,
    /// Optional bare image URL attached after the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Parsed and ready-to-send reminder; passed from the scheduler to the
/// Conversation Manager for delivery as a synthetic user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderDelivery {
    /// Originating job ID — used for logging.
    pub job_id: String,
    pub session_key: String,
    pub message: String,
    pub image_url: Option<String>,
    /// Raw channel-level chat ID parsed out of `session_key` by the router
    /// (e.g. a Telegram chat ID). `None` if the owning session's channel
    /// doesn't need one, or couldn't be parsed.
    #[serde(default)]
    pub channel_id: Option<u64>,
}
