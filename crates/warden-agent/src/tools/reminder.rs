//! `reminder` tool — schedule a proactive reminder via the scheduler engine.
//!
//! The AI calls this tool when the user asks "remind me in 2 hours", "send me
//! a heart image at midnight", etc. The tool persists a task to SQLite via
//! `SchedulerHandle`; the scheduler engine fires it and the daemon routes the
//! payload back into this session as a synthetic user turn.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use warden_core::reminder::ReminderAction;
use warden_scheduler::Schedule;

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

/// AI tool that creates, lists, and removes scheduled reminders.
///
/// Every reminder it creates is bound to the session it was called from —
/// there's no "broadcast to everyone" action, matching the scheduler's own
/// one-session-per-task delivery model.
pub struct ReminderTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    session_key: String,
    created_by: Option<String>,
}

impl<C: MessageContext + 'static> ReminderTool<C> {
    pub fn new(ctx: Arc<C>, session_key: &str, created_by: Option<String>) -> Self {
        Self {
            ctx,
            session_key: session_key.to_string(),
            created_by,
        }
    }

    async fn add_reminder(&self, input: &Value) -> ToolResult {
        let message = match input.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => return ToolResult::error("'message' is required for the add action"),
        };

        let image_url = input
            .get("image_url")
            .and_then(|v| v.as_str())
            .map(String::from);

        // Determine the schedule: recurring > fire_at > fire_in_seconds
        let schedule = if let Some(recurring) = input.get("recurring").and_then(|v| v.as_str()) {
            match Self::parse_recurring(recurring) {
                Ok(s) => s,
                Err(msg) => return ToolResult::error(msg),
            }
        } else if let Some(fire_at) = input.get("fire_at").and_then(|v| v.as_str()) {
            match chrono::DateTime::parse_from_rfc3339(fire_at) {
                Ok(dt) => Schedule::Once {
                    at: dt.with_timezone(&Utc),
                },
                Err(e) => return ToolResult::error(format!("invalid fire_at datetime: {e}")),
            }
        } else if let Some(secs) = input.get("fire_in_seconds").and_then(|v| v.as_i64()) {
            if secs <= 0 {
                return ToolResult::error("fire_in_seconds must be a positive integer");
            }
            Schedule::Once {
                at: Utc::now() + Duration::seconds(secs),
            }
        } else {
            return ToolResult::error(
                "one of 'fire_at', 'fire_in_seconds', or 'recurring' is required for add",
            );
        };

        let action = ReminderAction {
            message: message.clone(),
            session_key: self.session_key.clone(),
            image_url,
        };

        let payload = match serde_json::to_string(&action) {
            Ok(s) => s,
            Err(e) => return ToolResult::error(format!("serialization error: {e}")),
        };

        match self.ctx.scheduler().create_task(
            "reminder",
            schedule,
            &payload,
            self.created_by.as_deref(),
        ) {
            Ok(job) => ToolResult::success(format!(
                "Reminder scheduled!\n- Job ID: {}\n- Message: {}\n- Fires at: {}",
                job.id,
                message,
                job.next_run.as_deref().unwrap_or("unknown"),
            )),
            Err(e) => ToolResult::error(format!("failed to schedule reminder: {e}")),
        }
    }

    async fn list_reminders(&self) -> ToolResult {
        match self.ctx.scheduler().list_tasks() {
            Ok(jobs) => {
                let mine: Vec<_> = jobs
                    .iter()
                    .filter(|j| {
                        serde_json::from_str::<ReminderAction>(&j.payload)
                            .map(|a| a.session_key == self.session_key)
                            .unwrap_or(false)
                    })
                    .collect();
                if mine.is_empty() {
                    return ToolResult::success("No reminders scheduled for this session.");
                }
                let mut out = format!("Scheduled reminders ({}):\n", mine.len());
                for job in mine {
                    out.push_str(&format!(
                        "- ID: {} | Next: {} | Runs: {} | Status: {}\n",
                        job.id,
                        job.next_run.as_deref().unwrap_or("N/A"),
                        job.run_count,
                        job.status,
                    ));
                }
                ToolResult::success(out)
            }
            Err(e) => ToolResult::error(format!("failed to list reminders: {e}")),
        }
    }

    async fn remove_reminder(&self, input: &Value) -> ToolResult {
        let job_id = match input.get("job_id").and_then(|v| v.as_str()) {
            Some(id) if !id.is_empty() => id,
            _ => return ToolResult::error("'job_id' is required for the remove action"),
        };

        match self.ctx.scheduler().delete_task(job_id) {
            Ok(()) => ToolResult::success(format!("Reminder '{job_id}' removed.")),
            Err(e) => ToolResult::error(format!("failed to remove reminder: {e}")),
        }
    }

    /// Parse `"daily|HH:MM"` or `"interval|N"` into a [`Schedule`].
    ///
    /// `daily` compiles down to a 5-field cron expression — the scheduler has
    /// no dedicated daily variant, cron already covers it.
    fn parse_recurring(s: &str) -> Result<Schedule, String> {
        let mut parts = s.splitn(2, '|');
        let kind = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");

        match kind {
            "daily" => {
                let mut time = rest.splitn(2, ':');
                let hour: u8 = time
                    .next()
                    .unwrap_or("")
                    .parse()
                    .map_err(|_| "daily|HH:MM — invalid hour".to_string())?;
                let minute: u8 = time
                    .next()
                    .unwrap_or("")
                    .parse()
                    .map_err(|_| "daily|HH:MM — invalid minute".to_string())?;
                if hour > 23 || minute > 59 {
                    return Err(format!(
                        "daily|HH:MM — time {hour:02}:{minute:02} is out of range"
                    ));
                }
                Ok(Schedule::Cron {
                    expression: format!("{minute} {hour} * * *"),
                })
            }
            "interval" => {
                let secs: u64 = rest
                    .parse()
                    .map_err(|_| "interval|N — N must be a positive integer".to_string())?;
                if secs == 0 {
                    return Err("interval|N — N must be greater than 0".to_string());
                }
                Ok(Schedule::Interval { every_secs: secs })
            }
            other => Err(format!(
                "unknown recurring type '{other}': use 'daily|HH:MM' or 'interval|N'"
            )),
        }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for ReminderTool<C> {
    fn name(&self) -> &str {
        "reminder"
    }

    fn description(&self) -> &str {
        "ALWAYS use this tool when the user asks to be reminded, notified, or \
         woken up at a future time. This is a real async timer (1-second precision) — \
         the reminder is delivered back into the user's own session after the \
         specified delay. Do NOT respond with reminder text directly; call this \
         tool instead. Actions: 'add' (create), 'list' (view this session's \
         reminders), 'remove' (cancel by job_id)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "Operation: add a new reminder, list reminders for this session, or remove one."
                },
                "message": {
                    "type": "string",
                    "description": "Text to deliver when the reminder fires. Required for add."
                },
                "fire_at": {
                    "type": "string",
                    "description": "ISO-8601 UTC datetime when to fire (e.g. '2026-10-20T13:00:00Z'). Mutually exclusive with fire_in_seconds."
                },
                "fire_in_seconds": {
                    "type": "integer",
                    "description": "Seconds from now when to fire the reminder. Mutually exclusive with fire_at."
                },
                "recurring": {
                    "type": "string",
                    "description": "Optional recurrence pattern: 'daily|HH:MM' (UTC) or 'interval|N' (every N seconds). Overrides fire_at/fire_in_seconds."
                },
                "image_url": {
                    "type": "string",
                    "description": "Optional bare image URL attached after the reminder text."
                },
                "job_id": {
                    "type": "string",
                    "description": "Job ID returned by a previous add. Required for remove."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some(a) => a,
            None => return ToolResult::error("missing required field 'action'"),
        };

        match action {
            "add" => self.add_reminder(&input).await,
            "list" => self.list_reminders().await,
            "remove" => self.remove_reminder(&input).await,
            other => ToolResult::error(format!(
                "unknown action '{other}': must be 'add', 'list', or 'remove'"
            )),
        }
    }
}
