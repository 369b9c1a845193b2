//! Context Manager — token-budget accounting and raw-message reconstruction.
//!
//! Distinct from [`super::context::MessageContext`] (the per-channel DI
//! trait): this module turns a flat row of persisted `ConversationMessage`
//! history back into the block structure the provider expects — restoring
//! `tool_use`/`tool_result` pairs instead of flattening everything to plain
//! text — and decides when a session has grown past its configured budget.

use warden_memory::types::{ConversationMessage, MessageKind};

/// Rough token estimate: ~4 characters per token. No exact tokenizer is
/// wired in — providers differ and this number only drives a trim/compact
/// threshold, never billing (`tokens_in`/`tokens_out` on `ChatResponse` come
/// straight from the provider for that).
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

pub fn estimate_history_tokens(history: &[ConversationMessage]) -> u32 {
    history.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Whether a pre-flight compaction pass should run before this turn's
/// context is built. Triggers on either signal: the turn count has grown to
/// more than twice the keep-recent window, or the estimated token footprint
/// of the full history already sits within 75% of the configured budget.
pub fn should_compact(
    turn_count: i64,
    history_tokens: u32,
    keep_recent: u32,
    max_context_tokens: u32,
) -> bool {
    let turns_over_window = turn_count > (keep_recent as i64) * 2;
    let near_budget = (history_tokens as u64) * 100 >= (max_context_tokens as u64) * 75;
    turns_over_window || near_budget
}

/// Drop oldest history rows until the remainder fits `max_tokens`, always
/// keeping at least the most recent row so a single oversized turn never
/// empties the context entirely.
pub fn trim_context(history: Vec<ConversationMessage>, max_tokens: u32) -> Vec<ConversationMessage> {
    if history.len() <= 1 {
        return history;
    }
    let mut total = estimate_history_tokens(&history);
    let mut trimmed = history;
    while total > max_tokens && trimmed.len() > 1 {
        let removed = trimmed.remove(0);
        total = total.saturating_sub(estimate_tokens(&removed.content));
    }
    trimmed
}

#[derive(serde::Deserialize)]
struct ToolMeta {
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    tool_call_id: String,
}

fn tool_meta(m: &ConversationMessage) -> ToolMeta {
    m.metadata
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(ToolMeta {
            tool_name: String::new(),
            tool_call_id: String::new(),
        })
}

/// Reconstruct the raw provider-shaped message list from persisted history.
///
/// Consecutive `ToolCall` rows are grouped into one assistant message with
/// one `tool_use` block per row; consecutive `ToolResult` rows are grouped
/// into one user message with one `tool_result` block per row. Plain
/// `Message`/`CompactionSummary` rows become ordinary text turns, with user
/// turns wrapped in the `[channel timestamp] text` envelope the rest of the
/// pipeline uses. The result is run through `sanitize_conversation` so a
/// trim that lands mid tool-sequence never ships an orphaned block.
pub fn messages_to_raw(history: &[ConversationMessage]) -> Vec<serde_json::Value> {
    let mut raw: Vec<serde_json::Value> = Vec::new();
    let mut i = 0;
    while i < history.len() {
        let kind = history[i].kind;
        match kind {
            MessageKind::ToolCall => {
                let mut blocks = Vec::new();
                while i < history.len() && history[i].kind == MessageKind::ToolCall {
                    let call = &history[i];
                    let meta = tool_meta(call);
                    let input: serde_json::Value =
                        serde_json::from_str(&call.content).unwrap_or(serde_json::Value::Null);
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": meta.tool_call_id,
                        "name": meta.tool_name,
                        "input": input,
                    }));
                    i += 1;
                }
                raw.push(serde_json::json!({ "role": "assistant", "content": blocks }));
            }
            MessageKind::ToolResult => {
                let mut blocks = Vec::new();
                while i < history.len() && history[i].kind == MessageKind::ToolResult {
                    let result = &history[i];
                    let meta = tool_meta(result);
                    blocks.push(serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": meta.tool_call_id,
                        "content": result.content,
                        "is_error": false,
                    }));
                    i += 1;
                }
                raw.push(serde_json::json!({ "role": "user", "content": blocks }));
            }
            MessageKind::Message | MessageKind::CompactionSummary => {
                let m = &history[i];
                let is_assistant = m.role == "assistant";
                let content = if is_assistant || m.role == "system" {
                    m.content.clone()
                } else {
                    format_envelope(&m.channel, &m.created_at, &m.content)
                };
                let role = if is_assistant { "assistant" } else { "user" };
                raw.push(serde_json::json!({ "role": role, "content": content }));
                i += 1;
            }
        }
    }
    crate::sanitize::sanitize_conversation(&raw)
}

/// Wrap a message with a timestamp envelope: `[channel YYYY-MM-DD HH:MM UTC] content`.
/// Falls back to the raw content if the timestamp can't be parsed.
pub fn format_envelope(channel: &str, created_at: &str, content: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(created_at) {
        Ok(dt) => {
            let utc = dt.with_timezone(&chrono::Utc);
            format!("[{} {}] {}", channel, utc.format("%Y-%m-%d %H:%M UTC"), content)
        }
        Err(_) => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: MessageKind, role: &str, content: &str, meta: Option<&str>) -> ConversationMessage {
        ConversationMessage {
            id: 0,
            user_id: None,
            session_key: "s".to_string(),
            channel: "telegram".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            kind,
            metadata: meta.map(|s| s.to_string()),
            model_used: None,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn should_compact_fires_on_turn_count() {
        assert!(should_compact(100, 0, 20, 128_000));
        assert!(!should_compact(10, 0, 20, 128_000));
    }

    #[test]
    fn should_compact_fires_near_token_budget() {
        assert!(should_compact(1, 1_000, 20, 1_000));
        assert!(!should_compact(1, 10, 20, 1_000));
    }

    #[test]
    fn trim_context_keeps_at_least_one() {
        let history = vec![msg(MessageKind::Message, "user", &"x".repeat(100), None)];
        let trimmed = trim_context(history, 1);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn messages_to_raw_groups_tool_call_and_result() {
        let history = vec![
            msg(MessageKind::Message, "user", "hi", None),
            msg(
                MessageKind::ToolCall,
                "assistant",
                "{}",
                Some(r#"{"tool_name":"world_time","tool_call_id":"t1"}"#),
            ),
            msg(
                MessageKind::ToolResult,
                "user",
                "12:00",
                Some(r#"{"tool_name":"world_time","tool_call_id":"t1"}"#),
            ),
            msg(MessageKind::Message, "assistant", "it's noon", None),
        ];
        let raw = messages_to_raw(&history);
        assert_eq!(raw.len(), 4);
        assert_eq!(raw[1]["role"], "assistant");
        assert_eq!(raw[1]["content"][0]["type"], "tool_use");
        assert_eq!(raw[2]["role"], "user");
        assert_eq!(raw[2]["content"][0]["type"], "tool_result");
    }
}
