//! Tool registry — wraps the raw [`Tool`] implementations with the access
//! policy and output scrubbing that every call must pass through.
//!
//! Enforcement order on `execute()` mirrors the original tool dispatcher:
//! existence → enabled → Rule 700 → ordinary access-level check → handler.
//! The first two are this registry's job; the access checks delegate to
//! `warden_users::access`, which already encodes Rule 700's owner-only
//! fast-fail ahead of the per-tool level comparison.

use tracing::warn;
use warden_core::types::AccessLevel;
use warden_users::access;

use crate::provider::ToolDefinition;

use super::scrub::{scrub, ScrubLevel};
use super::{Tool, ToolResult};

/// A tool plus the access policy the registry enforces around it.
pub struct RegisteredTool {
    tool: Box<dyn Tool>,
    requires_access_level: AccessLevel,
    scrub_level: ScrubLevel,
    enabled: bool,
}

impl RegisteredTool {
    pub fn new(tool: Box<dyn Tool>) -> Self {
        Self {
            tool,
            requires_access_level: AccessLevel::Public,
            scrub_level: ScrubLevel::Aggressive,
            enabled: true,
        }
    }

    pub fn at_level(mut self, level: AccessLevel) -> Self {
        self.requires_access_level = level;
        self
    }

    pub fn with_scrub(mut self, level: ScrubLevel) -> Self {
        self.scrub_level = level;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }
}

/// Holds every tool available to a conversation and gates calls against the
/// caller's access level before the handler ever runs.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<RegisteredTool>) -> Self {
        Self { tools }
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tools visible to `caller_level`: enabled, and passing the access check.
    pub fn list_enabled(&self, caller_level: AccessLevel) -> Vec<&RegisteredTool> {
        self.tools
            .iter()
            .filter(|t| t.enabled)
            .filter(|t| {
                access::check_tool_call(t.name(), t.requires_access_level, caller_level).is_ok()
            })
            .collect()
    }

    /// API-level tool definitions for the set visible to `caller_level`.
    pub fn definitions(&self, caller_level: AccessLevel) -> Vec<ToolDefinition> {
        self.list_enabled(caller_level)
            .into_iter()
            .map(|t| ToolDefinition {
                name: t.tool.name().to_string(),
                description: t.tool.description().to_string(),
                input_schema: t.tool.input_schema(),
            })
            .collect()
    }

    /// Run a tool call for an ordinary (non-subagent) caller.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        caller_level: AccessLevel,
    ) -> ToolResult {
        let entry = match self.find(name) {
            Some(e) => e,
            None => return ToolResult::error(format!("Error: tool '{name}' not found.")),
        };

        if !entry.enabled {
            return ToolResult::error(format!("Error: tool '{name}' is disabled."));
        }

        if let Err(denial) =
            access::check_tool_call(name, entry.requires_access_level, caller_level)
        {
            warn!(tool = name, %denial, "tool call denied");
            return ToolResult::error(format!("Error: {denial}"));
        }

        self.run(entry, input).await
    }

    /// Run a tool call issued by a sub-agent worker: sub-agents operate at
    /// owner tier for work capability, but tools on the sub-agent-blocked
    /// list are refused regardless of level.
    pub async fn execute_for_subagent(&self, name: &str, input: serde_json::Value) -> ToolResult {
        let entry = match self.find(name) {
            Some(e) => e,
            None => return ToolResult::error(format!("Error: tool '{name}' not found.")),
        };

        if !entry.enabled {
            return ToolResult::error(format!("Error: tool '{name}' is disabled."));
        }

        if let Err(denial) = access::check_subagent_tool_call(name) {
            warn!(tool = name, %denial, "sub-agent tool call denied");
            return ToolResult::error(format!("Error: {denial}"));
        }

        self.run(entry, input).await
    }

    async fn run(&self, entry: &RegisteredTool, input: serde_json::Value) -> ToolResult {
        let result = entry.tool.execute(input).await;
        ToolResult {
            content: scrub(&result.content, entry.scrub_level),
            is_error: result.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, input: Value) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    struct OwnerTool;

    #[async_trait]
    impl Tool for OwnerTool {
        fn name(&self) -> &str {
            "manage_user"
        }
        fn description(&self) -> &str {
            "owner-only"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value) -> ToolResult {
            ToolResult::success("done")
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            RegisteredTool::new(Box::new(EchoTool)),
            RegisteredTool::new(Box::new(OwnerTool)).at_level(AccessLevel::Public),
        ])
    }

    #[tokio::test]
    async fn allows_ordinary_tool_at_public_level() {
        let reg = registry();
        let result = reg.execute("echo", json!({"a": 1}), AccessLevel::Public).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn rule_700_blocks_owner_only_tool_regardless_of_declared_level() {
        let reg = registry();
        let result = reg.execute("manage_user", json!({}), AccessLevel::Admin).await;
        assert!(result.is_error);
        assert!(result.content.contains("owner"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_not_found() {
        let reg = registry();
        let result = reg.execute("nope", json!({}), AccessLevel::Owner).await;
        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }

    #[tokio::test]
    async fn subagent_call_bypasses_level_but_not_blocklist() {
        let reg = registry();
        let allowed = reg.execute_for_subagent("echo", json!({})).await;
        assert!(!allowed.is_error);

        let blocked = reg.execute_for_subagent("manage_user", json!({})).await;
        assert!(blocked.is_error);
    }
}
