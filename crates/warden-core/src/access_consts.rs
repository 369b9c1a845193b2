//! Hardcoded access-control constants.
//!
//! These are compiled in, not stored in config — Rule 700 and Rule 760
//! cannot be toggled off by database configuration or user commands.

/// Tools that fail closed for anyone below `Owner`, checked before the
/// ordinary access-level check (Rule 700).
pub const OWNER_ONLY_TOOLS: &[&str] = &[
    "update_config",
    "update_soul",
    "update_ability",
    "manage_group",
    "manage_user",
    "manage_rule",
    "spawn_subagent",
];

/// Memory categories that are private to the owning user; recall across
/// users requires the requester to be `Owner` or `Admin` (Rule 760).
pub const PRIVATE_MEMORY_CATEGORIES: &[&str] = &["health", "relationship"];

/// Rule names starting with any of these prefixes cannot be removed or
/// edited regardless of the caller's tier.
pub const PROTECTED_RULE_PREFIXES: &[&str] = &["rule-700", "rule-760", "core-"];

/// Tools hidden from a sub-agent's schema and rejected at call time even if
/// the model somehow invokes them — sub-agents run at owner tier for work
/// capability but must not touch configuration, management, or spawn peers.
pub const SUBAGENT_BLOCKED_TOOLS: &[&str] = &[
    "update_config",
    "update_soul",
    "update_ability",
    "manage_group",
    "manage_user",
    "manage_rule",
    "spawn_subagent",
];

/// Substrings that disqualify a shell command from execution, checked by
/// any exec-style tool before running.
pub const COMMAND_BLACKLIST: &[&str] = &[
    "rm -rf /",
    "mkfs",
    ":(){ :|:& };:",
    "dd if=/dev/zero",
    "> /dev/sda",
    "shutdown",
    "reboot",
];

pub fn is_owner_only_tool(name: &str) -> bool {
    OWNER_ONLY_TOOLS.contains(&name)
}

pub fn is_private_memory_category(category: &str) -> bool {
    PRIVATE_MEMORY_CATEGORIES.contains(&category)
}

pub fn is_protected_rule_name(name: &str) -> bool {
    PROTECTED_RULE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub fn is_subagent_blocked_tool(name: &str) -> bool {
    SUBAGENT_BLOCKED_TOOLS.contains(&name)
}

pub fn command_blacklisted(command: &str) -> Option<&'static str> {
    COMMAND_BLACKLIST
        .iter()
        .find(|pattern| command.contains(**pattern))
        .copied()
}
