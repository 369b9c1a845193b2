//! Conversation sanitization for the Anthropic tool_use/tool_result contract.
//!
//! Anthropic requires every `tool_result` to reference a `tool_use_id` from the
//! immediately preceding assistant turn, and every `tool_use` to have a matching
//! `tool_result` in the next user turn. Context trimming or compaction can break
//! this pairing by dropping one side; this pass repairs or removes what's left
//! before the conversation goes out over the wire.

use serde_json::{json, Value};

/// Sanitize a list of raw (Anthropic content-block shaped) messages.
///
/// - Assistant turns with unmatched `tool_use` blocks are demoted to plain text.
/// - User turns with `tool_result` blocks that reference no preceding `tool_use`
///   are dropped entirely (or filtered down to only the matching ones).
/// - Consecutive messages with the same role are merged, since Anthropic
///   requires strict user/assistant alternation.
pub fn sanitize_conversation(conversation: &[Value]) -> Vec<Value> {
    if conversation.is_empty() {
        return Vec::new();
    }

    let mut sanitized: Vec<Value> = Vec::with_capacity(conversation.len());
    let mut i = 0;
    while i < conversation.len() {
        let msg = &conversation[i];

        if role_of(msg) == Some("assistant") {
            if let Some(content) = msg.get("content").and_then(Value::as_array) {
                let tool_use_ids = block_ids(content, "tool_use", "id");
                if !tool_use_ids.is_empty() {
                    let next = conversation.get(i + 1);
                    let next_results = next.and_then(|m| {
                        if role_of(m) == Some("user") {
                            m.get("content").and_then(Value::as_array)
                        } else {
                            None
                        }
                    });

                    if let Some(next_content) = next_results {
                        let result_ids = block_ids(next_content, "tool_result", "tool_use_id");
                        let matched: Vec<&String> =
                            tool_use_ids.iter().filter(|id| result_ids.contains(*id)).collect();

                        if !matched.is_empty() {
                            let filtered_assistant: Vec<Value> = content
                                .iter()
                                .filter(|b| {
                                    b.get("type").and_then(Value::as_str) != Some("tool_use")
                                        || b.get("id")
                                            .and_then(Value::as_str)
                                            .map(|id| matched.iter().any(|m| m.as_str() == id))
                                            .unwrap_or(false)
                                })
                                .cloned()
                                .collect();
                            let filtered_results: Vec<Value> = next_content
                                .iter()
                                .filter(|b| {
                                    b.get("type").and_then(Value::as_str) != Some("tool_result")
                                        || b.get("tool_use_id")
                                            .and_then(Value::as_str)
                                            .map(|id| matched.iter().any(|m| m.as_str() == id))
                                            .unwrap_or(false)
                                })
                                .cloned()
                                .collect();

                            sanitized.push(json!({"role": "assistant", "content": filtered_assistant}));
                            if !filtered_results.is_empty() {
                                sanitized.push(json!({"role": "user", "content": filtered_results}));
                            }
                            i += 2;
                            continue;
                        }
                    }

                    // No matching tool_results anywhere — demote to plain text.
                    let text_parts: Vec<&str> = content
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .filter(|t| !t.is_empty())
                        .collect();
                    let text = if text_parts.is_empty() {
                        "[tool calls without results — trimmed]".to_string()
                    } else {
                        text_parts.join(" ")
                    };
                    sanitized.push(json!({"role": "assistant", "content": text}));
                    i += 1;
                    continue;
                }
            }
        }

        if role_of(msg) == Some("user") {
            if let Some(content) = msg.get("content").and_then(Value::as_array) {
                let has_tool_results = content
                    .iter()
                    .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"));

                if has_tool_results {
                    let prev = sanitized.last();
                    let prev_tool_ids = prev.and_then(|p| {
                        if role_of(p) == Some("assistant") {
                            p.get("content")
                                .and_then(Value::as_array)
                                .map(|c| block_ids(c, "tool_use", "id"))
                        } else {
                            None
                        }
                    });

                    if let Some(prev_ids) = prev_tool_ids {
                        let filtered: Vec<Value> = content
                            .iter()
                            .filter(|b| {
                                b.get("type").and_then(Value::as_str) != Some("tool_result")
                                    || b.get("tool_use_id")
                                        .and_then(Value::as_str)
                                        .map(|id| prev_ids.contains(&id.to_string()))
                                        .unwrap_or(false)
                            })
                            .cloned()
                            .collect();
                        if !filtered.is_empty() {
                            sanitized.push(json!({"role": "user", "content": filtered}));
                        }
                    }
                    // else: orphaned tool_results with no preceding tool_use — dropped entirely.
                    i += 1;
                    continue;
                }
            }
        }

        sanitized.push(msg.clone());
        i += 1;
    }

    merge_consecutive_same_role(sanitized)
}

fn role_of(msg: &Value) -> Option<&str> {
    msg.get("role").and_then(Value::as_str)
}

fn block_ids(blocks: &[Value], block_type: &str, id_field: &str) -> Vec<String> {
    blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some(block_type))
        .filter_map(|b| b.get(id_field).and_then(Value::as_str))
        .map(String::from)
        .collect()
}

fn merge_consecutive_same_role(messages: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::with_capacity(messages.len());
    for msg in messages {
        let role = role_of(&msg).map(String::from);
        if let Some(last) = merged.last_mut() {
            if role_of(last).map(String::from) == role {
                let prev_content = last.get("content").cloned().unwrap_or(Value::Null);
                let new_content = msg.get("content").cloned().unwrap_or(Value::Null);
                let combined = match (&prev_content, &new_content) {
                    (Value::String(a), Value::String(b)) => Value::String(format!("{a}\n{b}")),
                    (Value::Array(a), Value::Array(b)) => {
                        let mut v = a.clone();
                        v.extend(b.clone());
                        Value::Array(v)
                    }
                    (Value::String(a), Value::Array(b)) => {
                        let mut v = vec![json!({"type": "text", "text": a})];
                        v.extend(b.clone());
                        Value::Array(v)
                    }
                    (Value::Array(a), Value::String(b)) => {
                        let mut v = a.clone();
                        v.push(json!({"type": "text", "text": b}));
                        Value::Array(v)
                    }
                    _ => new_content,
                };
                last["content"] = combined;
                continue;
            }
        }
        merged.push(msg);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_matched_tool_use_result_pair() {
        let conv = vec![
            json!({"role": "assistant", "content": [
                {"type": "text", "text": "checking"},
                {"type": "tool_use", "id": "t1", "name": "search", "input": {}}
            ]}),
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "ok"}
            ]}),
        ];
        let out = sanitize_conversation(&conv);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["role"], "assistant");
        assert_eq!(out[1]["role"], "user");
    }

    #[test]
    fn demotes_orphaned_tool_use_to_text() {
        let conv = vec![json!({"role": "assistant", "content": [
            {"type": "text", "text": "let me check"},
            {"type": "tool_use", "id": "t1", "name": "search", "input": {}}
        ]})];
        let out = sanitize_conversation(&conv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["content"], json!("let me check"));
    }

    #[test]
    fn drops_orphaned_tool_result() {
        let conv = vec![
            json!({"role": "user", "content": "hi"}),
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "ghost", "content": "x"}
            ]}),
        ];
        let out = sanitize_conversation(&conv);
        // The two user messages merge, then the orphan tool_result drop leaves just "hi".
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["content"], json!("hi"));
    }

    #[test]
    fn merges_consecutive_same_role_text() {
        let conv = vec![
            json!({"role": "user", "content": "first"}),
            json!({"role": "user", "content": "second"}),
        ];
        let out = sanitize_conversation(&conv);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["content"], json!("first\nsecond"));
    }

    #[test]
    fn empty_conversation_is_noop() {
        assert!(sanitize_conversation(&[]).is_empty());
    }
}
