//! Tool execution loop — the core agentic behavior.
//!
//! Flow: prompt → LLM → if tool_use → execute tools → inject results → LLM → repeat
//! Stops when: stop_reason is not "tool_use", the round cap is reached, or an error occurs.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::types::AccessLevel;
use warden_memory::types::MessageKind;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider};

use super::registry::ToolRegistry;

/// One assistant tool-call or tool-result turn generated mid-loop, handed
/// back to the caller so it can be persisted alongside the ordinary
/// user/assistant turns. The loop itself never touches storage — it has no
/// `MessageContext`, only a provider and a tool registry.
#[derive(Debug, Clone)]
pub struct ToolTurn {
    pub role: &'static str,
    pub kind: MessageKind,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
}

/// Result of a completed tool loop.
pub struct ToolLoopOutcome {
    pub response: ChatResponse,
    /// Every tool called, in call order (may contain duplicates).
    pub called_tools: Vec<String>,
    /// Assistant tool_use / tool tool_result turns generated this loop, in
    /// order, ready to persist.
    pub turns: Vec<ToolTurn>,
    /// Set when the loop was cut off by `max_rounds` rather than the model
    /// electing to stop on its own.
    pub hit_round_cap: bool,
}

/// Run the full tool execution loop (non-streaming).
///
/// Starts from `initial_request`, which must have `messages` or `raw_messages` set.
/// Returns the final `ChatResponse` (the one with `stop_reason != "tool_use"`),
/// every tool called along the way, and every tool_use/tool_result turn
/// generated so the caller can persist them.
///
/// `max_rounds` comes from `session.max_tool_rounds` — the caller reads
/// config, this function only enforces the number it's given. On reaching
/// the cap the loop forces one more round with tools withheld and a
/// directive to wrap up, so the final reply is never just the stale
/// in-progress response; the returned text also carries a user-visible
/// notice that the cap was hit.
///
/// Checked before each LLM round-trip; `cancel.cancel()` from another task
/// stops the loop before the next request goes out.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &ToolRegistry,
    caller_level: AccessLevel,
    max_rounds: usize,
    cancel: Option<&CancellationToken>,
    is_subagent: bool,
) -> Result<ToolLoopOutcome, crate::provider::ProviderError> {
    // Build initial raw JSON message list from the structured messages.
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let mut called_tools: Vec<String> = Vec::new();
    let mut turns: Vec<ToolTurn> = Vec::new();

    for iteration in 0..max_rounds {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            info!(iteration, "tool loop cancelled");
            return Err(crate::provider::ProviderError::Cancelled);
        }

        // Build the request for this iteration, injecting the full message history.
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(iteration, "tool loop iteration");

        let response = provider.send(&req).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(iteration, "tool loop complete — no more tool calls");
            return Ok(ToolLoopOutcome {
                response,
                called_tools,
                turns,
                hit_round_cap: false,
            });
        }

        // Build the assistant turn content block list.
        // It includes any text content plus the tool_use blocks.
        let mut assistant_content: Vec<serde_json::Value> = Vec::new();

        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
            turns.push(ToolTurn {
                role: "assistant",
                kind: MessageKind::Message,
                content: response.content.clone(),
                tool_name: None,
                tool_call_id: None,
            });
        }

        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
            turns.push(ToolTurn {
                role: "assistant",
                kind: MessageKind::ToolCall,
                content: call.input.to_string(),
                tool_name: Some(call.name.clone()),
                tool_call_id: Some(call.id.clone()),
            });
        }

        // Append the assistant message.
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        // Execute each tool call and collect results.
        let mut tool_result_content: Vec<serde_json::Value> = Vec::new();

        for call in &response.tool_calls {
            let result = if is_subagent {
                tools.execute_for_subagent(&call.name, call.input.clone()).await
            } else {
                tools.execute(&call.name, call.input.clone(), caller_level).await
            };
            called_tools.push(call.name.clone());
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
            turns.push(ToolTurn {
                role: "user",
                kind: MessageKind::ToolResult,
                content: result.content,
                tool_name: Some(call.name.clone()),
                tool_call_id: Some(call.id.clone()),
            });
        }

        // Append the user message containing all tool results.
        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));
    }

    warn!(max_rounds, "tool loop hit the round cap — forcing a no-tools wrap-up turn");

    raw_messages.push(serde_json::json!({
        "role": "user",
        "content": "STOP. You have reached the maximum number of tool rounds for this turn. \
                    Do not call any more tools — summarize your progress so far for the user.",
    }));

    let mut wrapup_req = initial_request.clone();
    wrapup_req.raw_messages = Some(raw_messages);
    wrapup_req.tools = Vec::new();

    let mut response = provider.send(&wrapup_req).await?;
    response.content = format!(
        "{}\n\n_(reached the {max_rounds}-round tool limit for this turn — stopped here)_",
        response.content
    );

    Ok(ToolLoopOutcome {
        response,
        called_tools,
        turns,
        hit_round_cap: true,
    })
}
