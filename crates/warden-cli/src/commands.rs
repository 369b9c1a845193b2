//! CLI-local slash commands: `/start`, `/status`, `/memory`, `/compact`,
//! `/forget`, `/identity`. Shared commands (`/help`, `/model`, `/tools`,
//! `/reload`, `/config`, `/version`) are handled by the common slash
//! dispatcher before this one runs.

use std::sync::Arc;

use warden_agent::pipeline::context::MessageContext;
use warden_agent::pipeline::compact::compact_session_if_needed;

use crate::context::CliContext;

/// Handle a CLI-local command. Returns `Some(response)` if handled.
pub async fn handle_local_command(
    text: &str,
    ctx: &Arc<CliContext>,
    session_key: &str,
    user_id: &str,
) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("/start") {
        let _ = ctx.sessions().get_or_create(session_key, user_id);
        return Some(
            "Welcome. I'm listening — type a message, or `/help` for the command list."
                .to_string(),
        );
    }

    if trimmed.eq_ignore_ascii_case("/status") {
        return Some(status_report(ctx, session_key, user_id));
    }

    if trimmed.eq_ignore_ascii_case("/memory") {
        return Some(memory_report(ctx, user_id));
    }

    if trimmed.eq_ignore_ascii_case("/compact") {
        compact_session_if_needed(Arc::clone(ctx), session_key.to_string()).await;
        let count = ctx.memory().count_turns(session_key).unwrap_or(0);
        return Some(format!(
            "Compaction pass run. {count} raw turns remain (compaction only \
             extracts facts once a session passes the turn threshold)."
        ));
    }

    if trimmed.eq_ignore_ascii_case("/forget") {
        let _ = ctx.sessions().archive(session_key);
        let history = ctx.memory().get_history(session_key, 10_000).unwrap_or_default();
        let ids: Vec<i64> = history.iter().map(|m| m.id).collect();
        let count = ctx.memory().delete_turns(&ids).unwrap_or(0);
        return Some(format!(
            "Session archived. Removed {count} messages. A fresh session starts on your next message."
        ));
    }

    if trimmed.eq_ignore_ascii_case("/identity") {
        return Some(identity_report(ctx, user_id));
    }

    None
}

fn status_report(ctx: &Arc<CliContext>, session_key: &str, user_id: &str) -> String {
    let session = ctx.sessions().get(session_key).ok().flatten();
    let turns = ctx.memory().count_turns(session_key).unwrap_or(0);
    let user = ctx.users().get_user(user_id).ok().flatten();

    let (status, message_count, last_model) = match &session {
        Some(s) => (
            s.status.to_string(),
            s.message_count,
            s.last_model.clone().unwrap_or_else(|| "—".to_string()),
        ),
        None => ("no session yet".to_string(), 0, "—".to_string()),
    };
    let access_level = user
        .map(|u| u.access_level.to_string())
        .unwrap_or_else(|| "public".to_string());

    format!(
        "**Status**\n- Session: `{session_key}` ({status})\n- Messages: {message_count}\n\
         - Raw turns stored: {turns}\n- Last model: `{last_model}`\n- Access level: `{access_level}`"
    )
}

fn memory_report(ctx: &Arc<CliContext>, user_id: &str) -> String {
    match ctx.memory().build_user_context(user_id) {
        Ok(c) if c.memory_count == 0 => "No memories stored yet.".to_string(),
        Ok(c) => format!("**Memory** ({} entries)\n\n{}", c.memory_count, c.rendered),
        Err(e) => format!("Failed to load memory: {e}"),
    }
}

fn identity_report(ctx: &Arc<CliContext>, user_id: &str) -> String {
    let identities = ctx.users().list_identities(user_id).unwrap_or_default();
    let user = ctx.users().get_user(user_id).ok().flatten();

    let mut out = match &user {
        Some(u) => format!(
            "**Identity**\n- User ID: `{}`\n- Name: {}\n- Access level: `{}`\n",
            u.id, u.display_name, u.access_level
        ),
        None => format!("**Identity**\n- User ID: `{user_id}` (not yet registered)\n"),
    };

    if identities.is_empty() {
        out.push_str("\nNo linked channel identities.");
    } else {
        out.push_str("\nLinked identities:\n");
        for ident in identities {
            out.push_str(&format!("- {} / {}\n", ident.channel, ident.identifier));
        }
    }
    out
}
