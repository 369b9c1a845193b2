//! `spawn_subagent` tool — delegates a task to a worker turn that runs
//! independently of the calling conversation.
//!
//! Owner-only by `access_consts::OWNER_ONLY_TOOLS`, and itself listed in
//! `SUBAGENT_BLOCKED_TOOLS` — a worker can never call this tool, so there is
//! no nesting by construction, not by a runtime check here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

pub struct SpawnSubagentTool<C: MessageContext + 'static> {
    ctx: Arc<C>,
    session_key: String,
}

impl<C: MessageContext + 'static> SpawnSubagentTool<C> {
    pub fn new(ctx: Arc<C>, session_key: &str) -> Self {
        Self {
            ctx,
            session_key: session_key.to_string(),
        }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for SpawnSubagentTool<C> {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a background worker that runs its own \
         tool-call loop and reports back when done. Use for work that would take many \
         rounds on its own and doesn't need you in the loop turn by turn — the worker \
         cannot spawn further sub-agents and cannot call owner-only tools. Returns a \
         run ID immediately; the task keeps running after this call returns."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Full, self-contained description of the task for the worker to complete."
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let task = match input.get("task").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return ToolResult::error("'task' is required"),
        };

        match self
            .ctx
            .subagents()
            .spawn(Arc::clone(&self.ctx), self.session_key.clone(), task)
            .await
        {
            Ok(run_id) => ToolResult::success(format!(
                "Sub-agent spawned (run ID: {run_id}). It's running independently; check back \
                 with its run ID if you need the result, or it may be reported to you directly \
                 once complete."
            )),
            Err(e) => ToolResult::error(format!("failed to spawn sub-agent: {e}")),
        }
    }
}
