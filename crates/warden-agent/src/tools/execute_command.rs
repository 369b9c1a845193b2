//! `execute_command` tool — one-shot shell command execution.
//!
//! Generic over `C: MessageContext` for consistency with the other tools,
//! though this one doesn't touch the context — it runs `sh -c` directly and
//! is gated by the shared command blacklist and a timeout.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::pipeline::context::MessageContext;

use super::{Tool, ToolResult};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Tool that executes shell commands via `sh -c`.
///
/// Every command is checked against `warden_users::access::check_command`
/// before it runs; matches are refused outright rather than attempted.
pub struct ExecuteCommandTool<C: MessageContext + 'static> {
    _marker: PhantomData<Arc<C>>,
}

impl<C: MessageContext + 'static> ExecuteCommandTool<C> {
    pub fn new(_ctx: Arc<C>) -> Self {
        Self { _marker: PhantomData }
    }
}

#[async_trait]
impl<C: MessageContext + 'static> Tool for ExecuteCommandTool<C> {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout and stderr. \
         Commands are checked against a blacklist (rm -rf /, mkfs, shutdown, etc.) \
         before running. Default timeout is 30 seconds."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute via sh -c."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("missing required parameter: command"),
        };

        if let Err(denial) = warden_users::access::check_command(command) {
            return ToolResult::error(format!("Error: {denial}"));
        }

        let run = tokio::process::Command::new("sh").arg("-c").arg(command).output();

        match tokio::time::timeout(TIMEOUT, run).await {
            Err(_) => ToolResult::error(format!("command timed out after {}s", TIMEOUT.as_secs())),
            Ok(Err(e)) => ToolResult::error(format!("failed to spawn command: {e}")),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                let mut out = String::new();
                if !stdout.is_empty() {
                    out.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("[stderr]\n");
                    out.push_str(&stderr);
                }
                if !output.status.success() {
                    out.push_str(&format!("\n[exit code: {}]", output.status.code().unwrap_or(-1)));
                }
                if out.is_empty() {
                    out = "(no output)".to_string();
                }

                ToolResult::success(out)
            }
        }
    }
}
