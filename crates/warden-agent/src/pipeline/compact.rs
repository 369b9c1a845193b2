//! Session compaction — collapses aged-out history into one summary turn.
//!
//! When a session's history grows past the configured budget, the oldest
//! turns (everything beyond `session.compaction_keep_recent`) are summarized
//! by a single LLM call into one paragraph, then swapped in for the turns it
//! covers via `MemoryManager::replace_with_summary`: the span is deleted and
//! replaced by exactly one `kind = compaction_summary` row. Runs synchronously
//! as part of pre-flight context building — before the next request's
//! history is loaded — never as a fire-and-forget background task, so the
//! turn that triggered compaction already sees the compacted history.

use std::sync::Arc;

use tracing::{info, warn};

use crate::provider::{ChatRequest, Message, Role};

use super::context::MessageContext;
use super::context_manager;

/// Cheap model used for summarization. Kept distinct from the session's
/// active chat model — a compaction summary doesn't need the full model's
/// reasoning budget.
const COMPACTION_MODEL: &str = "claude-haiku-4-5-20251001";

/// Compact `session_key`'s history if it has grown past the configured
/// budget. Returns `true` if compaction ran.
pub async fn compact_session_if_needed<C: MessageContext + 'static>(
    ctx: &Arc<C>,
    session_key: &str,
) -> bool {
    let session_cfg = &ctx.config().session;

    let turn_count = match ctx.memory().count_turns(session_key) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, session = %session_key, "compact: count_turns failed");
            return false;
        }
    };

    let keep_recent = session_cfg.compaction_keep_recent;
    if turn_count <= keep_recent as i64 {
        return false;
    }

    let full_history = ctx
        .memory()
        .get_history(session_key, turn_count as usize)
        .unwrap_or_default();
    let history_tokens = context_manager::estimate_history_tokens(&full_history);

    if !context_manager::should_compact(
        turn_count,
        history_tokens,
        keep_recent,
        session_cfg.max_context_tokens,
    ) {
        return false;
    }

    let span_len = (turn_count - keep_recent as i64).max(0) as usize;
    if span_len == 0 {
        return false;
    }

    let span = match ctx.memory().get_oldest_turns(session_key, span_len) {
        Ok(turns) if !turns.is_empty() => turns,
        Ok(_) => return false,
        Err(e) => {
            warn!(error = %e, session = %session_key, "compact: get_oldest_turns failed");
            return false;
        }
    };

    info!(
        session = %session_key,
        turns = span.len(),
        "compact: summarizing oldest turns before context build"
    );

    let transcript: String = span
        .iter()
        .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let req = ChatRequest {
        model: COMPACTION_MODEL.to_string(),
        system: concat!(
            "You summarize the oldest portion of a conversation so it can be dropped from the ",
            "active context while preserving what matters. Write one concise paragraph covering: ",
            "what the user asked for, what was done or decided, and any facts or preferences the ",
            "user stated. Do not include tool call/result details verbatim. Third person, present tense."
        )
        .to_string(),
        system_prompt: None,
        messages: vec![Message {
            role: Role::User,
            content: format!("Summarize this conversation segment:\n\n{}", transcript),
        }],
        max_tokens: 400,
        stream: false,
        thinking: None,
        tools: Vec::new(),
        raw_messages: None,
    };

    let summary = match ctx.agent().provider().send(&req).await {
        Ok(r) => r.content,
        Err(e) => {
            warn!(error = %e, session = %session_key, "compact: summarization call failed");
            return false;
        }
    };

    let ids: Vec<i64> = span.iter().map(|m| m.id).collect();
    match ctx.memory().replace_with_summary(session_key, &ids, &summary) {
        Ok(()) => {
            info!(session = %session_key, turns_collapsed = ids.len(), "compact: session compacted");
            true
        }
        Err(e) => {
            warn!(error = %e, session = %session_key, "compact: replace_with_summary failed");
            false
        }
    }
}
