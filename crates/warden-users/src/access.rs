//! Hardcoded access-control enforcement: Rule 700, Rule 760, group
//! degradation, sub-agent capability filtering, rule-removal guard, and the
//! shell command blacklist. None of this is configurable at runtime — it is
//! defense-in-depth that sits underneath whatever the ordinary per-tool
//! access level says.

use warden_core::access_consts::{
    command_blacklisted, is_owner_only_tool, is_private_memory_category, is_protected_rule_name,
    is_subagent_blocked_tool,
};
use warden_core::types::AccessLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenial {
    /// Rule 700: the tool is owner-only and the caller is not the owner.
    OwnerOnly,
    /// The caller's effective level is below the tool's declared requirement.
    InsufficientLevel {
        required: AccessLevel,
        have: AccessLevel,
    },
    /// Rule removal guard: the rule name is protected.
    ProtectedRule,
    /// Sub-agent tried to call a tool outside its filtered set.
    SubagentBlocked,
    /// Command blacklist hit.
    CommandBlacklisted { pattern: &'static str },
}

impl std::fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessDenial::OwnerOnly => write!(f, "this action is restricted to the owner"),
            AccessDenial::InsufficientLevel { required, have } => write!(
                f,
                "requires {} access, caller has {}",
                required, have
            ),
            AccessDenial::ProtectedRule => write!(f, "this rule is protected and cannot be modified"),
            AccessDenial::SubagentBlocked => {
                write!(f, "this tool is not available to sub-agents")
            }
            AccessDenial::CommandBlacklisted { pattern } => {
                write!(f, "command matches a blacklisted pattern: {}", pattern)
            }
        }
    }
}

/// Full access check for an ordinary (non-subagent) tool call: Rule 700
/// first, then the ordinary access-level comparison. Mirrors the registry's
/// execute() order: existence/enabled is the caller's job before this.
pub fn check_tool_call(
    tool_name: &str,
    required_level: AccessLevel,
    caller_level: AccessLevel,
) -> Result<(), AccessDenial> {
    if is_owner_only_tool(tool_name) && !caller_level.is_owner() {
        return Err(AccessDenial::OwnerOnly);
    }
    if caller_level < required_level {
        return Err(AccessDenial::InsufficientLevel {
            required: required_level,
            have: caller_level,
        });
    }
    Ok(())
}

/// Sub-agents run at owner tier for work capability, but calling a blocked
/// name is refused regardless.
pub fn check_subagent_tool_call(tool_name: &str) -> Result<(), AccessDenial> {
    if is_subagent_blocked_tool(tool_name) {
        return Err(AccessDenial::SubagentBlocked);
    }
    Ok(())
}

/// Strip tool names a sub-agent must never see from its offered schema.
pub fn filter_tools_for_subagent(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| !is_subagent_blocked_tool(n))
        .cloned()
        .collect()
}

/// Strip owner-only tool names from the schema offered in a group chat.
pub fn filter_tools_for_group(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| !is_owner_only_tool(n))
        .cloned()
        .collect()
}

/// Rule 760: does a private-category memory owned by `owner_id` pass
/// through recall for `requester_id` at `requester_level`?
pub fn memory_visible(
    category: &str,
    owner_id: &str,
    requester_id: &str,
    requester_level: AccessLevel,
) -> bool {
    if !is_private_memory_category(category) {
        return true;
    }
    if owner_id == requester_id {
        return true;
    }
    requester_level.is_owner_or_admin()
}

/// Rule-removal guard: protected rule names cannot be edited or deleted by
/// anyone, regardless of tier.
pub fn check_rule_mutation(rule_name: &str) -> Result<(), AccessDenial> {
    if is_protected_rule_name(rule_name) {
        return Err(AccessDenial::ProtectedRule);
    }
    Ok(())
}

/// Command blacklist: shell-exec tools must consult this before running.
pub fn check_command(command: &str) -> Result<(), AccessDenial> {
    if let Some(pattern) = command_blacklisted(command) {
        return Err(AccessDenial::CommandBlacklisted { pattern });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_700_blocks_non_owner() {
        let err = check_tool_call("manage_user", AccessLevel::Public, AccessLevel::Admin).unwrap_err();
        assert_eq!(err, AccessDenial::OwnerOnly);
    }

    #[test]
    fn rule_700_allows_owner() {
        assert!(check_tool_call("manage_user", AccessLevel::Public, AccessLevel::Owner).is_ok());
    }

    #[test]
    fn ordinary_level_check_applies_to_non_owner_only_tools() {
        let err = check_tool_call("world_time", AccessLevel::Friend, AccessLevel::Public).unwrap_err();
        assert!(matches!(err, AccessDenial::InsufficientLevel { .. }));
    }

    #[test]
    fn rule_760_hides_private_memory_from_other_users() {
        assert!(!memory_visible("health", "alice", "bob", AccessLevel::Friend));
        assert!(memory_visible("health", "alice", "alice", AccessLevel::Public));
        assert!(memory_visible("health", "alice", "bob", AccessLevel::Admin));
    }

    #[test]
    fn subagent_blocked_tools_are_filtered() {
        let names = vec!["world_time".to_string(), "manage_user".to_string()];
        let filtered = filter_tools_for_subagent(&names);
        assert_eq!(filtered, vec!["world_time".to_string()]);
    }

    #[test]
    fn protected_rule_cannot_be_mutated() {
        assert!(check_rule_mutation("rule-700-owner-only").is_err());
        assert!(check_rule_mutation("custom-rule").is_ok());
    }
}
